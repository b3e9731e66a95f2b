//! Library for reading and writing point cloud files.
//!
//! Two container formats are supported: PCD (ascii, binary and LZF
//! binary_compressed payloads) and LAS 1.2/1.3/1.4 with point record formats
//! 0 to 10. Both codecs produce and consume the same in-memory
//! [PointCloud] of colored points.
//!
//! ```no_run
//! use scanforge::{load_pcd, save_las, LasHeader};
//!
//! fn main() -> scanforge::Result<()> {
//!     let (header, cloud) = load_pcd("scan.pcd")?;
//!     println!("{} points, dense: {}", cloud.len(), cloud.is_dense);
//!
//!     let las_header = LasHeader::for_cloud(&cloud, 3)?;
//!     save_las("scan.las", &las_header, &cloud)?;
//!     Ok(())
//! }
//! ```

mod error;
pub mod las;
pub mod lzf;
pub mod pcd;
mod point;
pub mod record;

pub use error::{Error, Result};
pub use las::{load_las, point_record_length, save_las, LasHeader};
pub use pcd::{load_pcd, save_pcd, DataType, PcdHeader};
pub use point::{Bounds, Color, Point, PointCloud, Vector};
pub use record::{FieldDescriptor, RecordLayout};
