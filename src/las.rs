//! LAS (LASer) file reader and writer for versions 1.2 through 1.4.
//!
//! The header is a strictly ordered little-endian record with two optional
//! tails (a waveform offset from 1.3, extended VLR and point counters from
//! 1.4). Point records come in formats 0 to 10; which optional fields a
//! format carries is derived from the format number rather than branched on
//! per call site.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::point::{Color, Point, PointCloud, Vector};

const SIGNATURE: [u8; 4] = *b"LASF";

/// Highest point data record format defined by the LAS spec.
const MAX_POINT_FORMAT: u8 = 10;

/// LAS public header block.
///
/// Field names follow the ASPRS specification. The two fixed 32-byte strings
/// are NUL padded; use [system_identifier] and [generating_software] for
/// trimmed views.
///
/// [system_identifier]: Self::system_identifier
/// [generating_software]: Self::generating_software
#[derive(Clone, Debug)]
pub struct LasHeader {
    pub file_source_id: u16,
    pub global_encoding: u16,
    pub project_id: [u32; 4],
    pub version_major: u8,
    pub version_minor: u8,
    pub system_identifier: [u8; 32],
    pub generating_software: [u8; 32],
    pub file_creation_day_of_year: u16,
    pub file_creation_year: u16,
    pub header_size: u16,
    pub offset_to_point_data: u32,
    pub number_of_variable_length_records: u32,
    pub point_data_record_format: u8,
    pub point_data_record_length: u16,
    pub legacy_number_of_point_records: u32,
    pub legacy_number_of_points_by_return: [u32; 5],
    pub x_scale_factor: f64,
    pub y_scale_factor: f64,
    pub z_scale_factor: f64,
    pub x_offset: f64,
    pub y_offset: f64,
    pub z_offset: f64,
    pub max_x: f64,
    pub min_x: f64,
    pub max_y: f64,
    pub min_y: f64,
    pub max_z: f64,
    pub min_z: f64,
    /// Present from LAS 1.3
    pub start_of_waveform_data_packet_record: u64,
    /// Present from LAS 1.4
    pub start_of_first_evlr: u64,
    /// Present from LAS 1.4
    pub number_of_evlrs: u32,
    /// Present from LAS 1.4
    pub number_of_point_records: u64,
    /// Present from LAS 1.4
    pub number_of_points_by_return: [u64; 15],
}

impl Default for LasHeader {
    fn default() -> Self {
        LasHeader {
            file_source_id: 0,
            global_encoding: 0,
            project_id: [0; 4],
            version_major: 1,
            version_minor: 2,
            system_identifier: [0; 32],
            generating_software: [0; 32],
            file_creation_day_of_year: 0,
            file_creation_year: 0,
            header_size: 227,
            offset_to_point_data: 227,
            number_of_variable_length_records: 0,
            point_data_record_format: 0,
            point_data_record_length: 20,
            legacy_number_of_point_records: 0,
            legacy_number_of_points_by_return: [0; 5],
            x_scale_factor: 1.0,
            y_scale_factor: 1.0,
            z_scale_factor: 1.0,
            x_offset: 0.0,
            y_offset: 0.0,
            z_offset: 0.0,
            max_x: 0.0,
            min_x: 0.0,
            max_y: 0.0,
            min_y: 0.0,
            max_z: 0.0,
            min_z: 0.0,
            start_of_waveform_data_packet_record: 0,
            start_of_first_evlr: 0,
            number_of_evlrs: 0,
            number_of_point_records: 0,
            number_of_points_by_return: [0; 15],
        }
    }
}

/// Point record byte length for a given format.
pub fn point_record_length(format: u8) -> Result<u16> {
    match format {
        0 => Ok(20),
        1 => Ok(28),
        2 => Ok(26),
        3 => Ok(34),
        4 => Ok(57),
        5 => Ok(63),
        6 => Ok(30),
        7 => Ok(36),
        8 => Ok(38),
        9 => Ok(59),
        10 => Ok(67),
        other => Err(Error::UnsupportedPointFormat(other)),
    }
}

impl LasHeader {
    /// Reads a header from `src`, validating signature, version and point
    /// format before returning.
    pub fn read_from<R: Read>(src: &mut R) -> Result<LasHeader> {
        let mut signature = [0u8; 4];
        src.read_exact(&mut signature)?;
        if signature != SIGNATURE {
            return Err(Error::InvalidSignature(signature));
        }

        let mut header = LasHeader::default();
        header.file_source_id = src.read_u16::<LittleEndian>()?;
        header.global_encoding = src.read_u16::<LittleEndian>()?;
        for part in header.project_id.iter_mut() {
            *part = src.read_u32::<LittleEndian>()?;
        }
        header.version_major = src.read_u8()?;
        header.version_minor = src.read_u8()?;
        if header.version_major != 1 || !(2..=4).contains(&header.version_minor) {
            return Err(Error::UnsupportedVersion {
                major: header.version_major,
                minor: header.version_minor,
            });
        }

        src.read_exact(&mut header.system_identifier)?;
        src.read_exact(&mut header.generating_software)?;
        header.file_creation_day_of_year = src.read_u16::<LittleEndian>()?;
        header.file_creation_year = src.read_u16::<LittleEndian>()?;
        header.header_size = src.read_u16::<LittleEndian>()?;
        header.offset_to_point_data = src.read_u32::<LittleEndian>()?;
        header.number_of_variable_length_records = src.read_u32::<LittleEndian>()?;
        header.point_data_record_format = src.read_u8()?;
        if header.point_data_record_format > MAX_POINT_FORMAT {
            return Err(Error::UnsupportedPointFormat(header.point_data_record_format));
        }
        header.point_data_record_length = src.read_u16::<LittleEndian>()?;
        header.legacy_number_of_point_records = src.read_u32::<LittleEndian>()?;
        for count in header.legacy_number_of_points_by_return.iter_mut() {
            *count = src.read_u32::<LittleEndian>()?;
        }

        header.x_scale_factor = src.read_f64::<LittleEndian>()?;
        header.y_scale_factor = src.read_f64::<LittleEndian>()?;
        header.z_scale_factor = src.read_f64::<LittleEndian>()?;
        header.x_offset = src.read_f64::<LittleEndian>()?;
        header.y_offset = src.read_f64::<LittleEndian>()?;
        header.z_offset = src.read_f64::<LittleEndian>()?;
        header.max_x = src.read_f64::<LittleEndian>()?;
        header.min_x = src.read_f64::<LittleEndian>()?;
        header.max_y = src.read_f64::<LittleEndian>()?;
        header.min_y = src.read_f64::<LittleEndian>()?;
        header.max_z = src.read_f64::<LittleEndian>()?;
        header.min_z = src.read_f64::<LittleEndian>()?;

        if header.version_minor >= 3 {
            header.start_of_waveform_data_packet_record = src.read_u64::<LittleEndian>()?;
        }
        if header.version_minor >= 4 {
            header.start_of_first_evlr = src.read_u64::<LittleEndian>()?;
            header.number_of_evlrs = src.read_u32::<LittleEndian>()?;
            header.number_of_point_records = src.read_u64::<LittleEndian>()?;
            for count in header.number_of_points_by_return.iter_mut() {
                *count = src.read_u64::<LittleEndian>()?;
            }
        }

        Ok(header)
    }

    /// Writes the header in wire order, including the version-gated tails.
    pub fn write_to<W: Write>(&self, dst: &mut W) -> Result<()> {
        dst.write_all(&SIGNATURE)?;
        dst.write_u16::<LittleEndian>(self.file_source_id)?;
        dst.write_u16::<LittleEndian>(self.global_encoding)?;
        for part in self.project_id {
            dst.write_u32::<LittleEndian>(part)?;
        }
        dst.write_u8(self.version_major)?;
        dst.write_u8(self.version_minor)?;
        dst.write_all(&self.system_identifier)?;
        dst.write_all(&self.generating_software)?;
        dst.write_u16::<LittleEndian>(self.file_creation_day_of_year)?;
        dst.write_u16::<LittleEndian>(self.file_creation_year)?;
        dst.write_u16::<LittleEndian>(self.header_size)?;
        dst.write_u32::<LittleEndian>(self.offset_to_point_data)?;
        dst.write_u32::<LittleEndian>(self.number_of_variable_length_records)?;
        dst.write_u8(self.point_data_record_format)?;
        dst.write_u16::<LittleEndian>(self.point_data_record_length)?;
        dst.write_u32::<LittleEndian>(self.legacy_number_of_point_records)?;
        for count in self.legacy_number_of_points_by_return {
            dst.write_u32::<LittleEndian>(count)?;
        }

        dst.write_f64::<LittleEndian>(self.x_scale_factor)?;
        dst.write_f64::<LittleEndian>(self.y_scale_factor)?;
        dst.write_f64::<LittleEndian>(self.z_scale_factor)?;
        dst.write_f64::<LittleEndian>(self.x_offset)?;
        dst.write_f64::<LittleEndian>(self.y_offset)?;
        dst.write_f64::<LittleEndian>(self.z_offset)?;
        dst.write_f64::<LittleEndian>(self.max_x)?;
        dst.write_f64::<LittleEndian>(self.min_x)?;
        dst.write_f64::<LittleEndian>(self.max_y)?;
        dst.write_f64::<LittleEndian>(self.min_y)?;
        dst.write_f64::<LittleEndian>(self.max_z)?;
        dst.write_f64::<LittleEndian>(self.min_z)?;

        if self.version_minor >= 3 {
            dst.write_u64::<LittleEndian>(self.start_of_waveform_data_packet_record)?;
        }
        if self.version_minor >= 4 {
            dst.write_u64::<LittleEndian>(self.start_of_first_evlr)?;
            dst.write_u32::<LittleEndian>(self.number_of_evlrs)?;
            dst.write_u64::<LittleEndian>(self.number_of_point_records)?;
            for count in self.number_of_points_by_return {
                dst.write_u64::<LittleEndian>(count)?;
            }
        }
        Ok(())
    }

    /// Synthesizes a LAS 1.3 header for `cloud` with centimeter precision.
    pub fn for_cloud(cloud: &PointCloud, format: u8) -> Result<LasHeader> {
        let record_length = point_record_length(format)?;
        let bounds = cloud.bounds();

        let mut header = LasHeader {
            version_minor: 3,
            header_size: 235,
            offset_to_point_data: 235,
            point_data_record_format: format,
            point_data_record_length: record_length,
            legacy_number_of_point_records: cloud.len() as u32,
            x_scale_factor: 0.01,
            y_scale_factor: 0.01,
            z_scale_factor: 0.01,
            min_x: bounds.min_x,
            max_x: bounds.max_x,
            min_y: bounds.min_y,
            max_y: bounds.max_y,
            min_z: bounds.min_z,
            max_z: bounds.max_z,
            ..Default::default()
        };

        let software = concat!("scanforge ", env!("CARGO_PKG_VERSION")).as_bytes();
        let len = software.len().min(31);
        header.generating_software[..len].copy_from_slice(&software[..len]);
        Ok(header)
    }

    /// True for a supported signature/version/point format combination.
    pub fn is_valid(&self) -> bool {
        self.version_major == 1
            && (2..=4).contains(&self.version_minor)
            && self.point_data_record_format <= MAX_POINT_FORMAT
    }

    /// Version as a display string, e.g. "1.4".
    pub fn version(&self) -> String {
        format!("{}.{}", self.version_major, self.version_minor)
    }

    /// Point count, using the extended field for LAS 1.4+.
    pub fn total_point_count(&self) -> u64 {
        if self.version_minor >= 4 {
            self.number_of_point_records
        } else {
            self.legacy_number_of_point_records as u64
        }
    }

    /// True when the point records carry 16-bit RGB channels.
    pub fn has_color(&self) -> bool {
        matches!(self.point_data_record_format, 2 | 3 | 7 | 8 | 10)
    }

    /// True when the point records carry an 8-byte GPS time.
    pub fn has_gps_time(&self) -> bool {
        matches!(self.point_data_record_format, 1 | 3 | 4 | 5)
            || self.point_data_record_format >= 6
    }

    /// True when the point records carry a near-infrared channel.
    pub fn has_nir(&self) -> bool {
        matches!(self.point_data_record_format, 8 | 10)
    }

    pub fn system_identifier(&self) -> String {
        String::from_utf8_lossy(&self.system_identifier)
            .trim_end_matches(char::from(0))
            .to_string()
    }

    pub fn generating_software(&self) -> String {
        String::from_utf8_lossy(&self.generating_software)
            .trim_end_matches(char::from(0))
            .to_string()
    }
}

/// Loads a LAS file from `path`.
pub fn load_las<P: AsRef<Path>>(path: P) -> Result<(LasHeader, PointCloud)> {
    let mut src = BufReader::new(File::open(path)?);
    read_las_from(&mut src)
}

/// Reads a header and all point records from any seekable source.
pub fn read_las_from<R: Read + Seek>(src: &mut R) -> Result<(LasHeader, PointCloud)> {
    let header = LasHeader::read_from(src)?;
    src.seek(SeekFrom::Start(header.offset_to_point_data as u64))?;

    let num_points = header.total_point_count();
    let mut cloud = PointCloud::with_capacity(num_points as usize);
    cloud.width = num_points as u32;
    cloud.height = 1;

    for _ in 0..num_points {
        let point = read_point_record(src, &header)?;
        if !point.position.is_finite() {
            cloud.is_dense = false;
            continue;
        }
        cloud.push(point);
    }

    debug!("loaded {} points (LAS {})", cloud.len(), header.version());
    Ok((header, cloud))
}

/// Saves `cloud` to `path` using `header` for layout and transforms.
pub fn save_las<P: AsRef<Path>>(path: P, header: &LasHeader, cloud: &PointCloud) -> Result<()> {
    let mut dst = BufWriter::new(File::create(path)?);
    write_las_to(&mut dst, header, cloud)?;
    dst.flush()?;
    Ok(())
}

/// Writes a header and all point records to any sink.
pub fn write_las_to<W: Write>(dst: &mut W, header: &LasHeader, cloud: &PointCloud) -> Result<()> {
    if header.point_data_record_format > MAX_POINT_FORMAT {
        return Err(Error::UnsupportedPointFormat(header.point_data_record_format));
    }
    header.write_to(dst)?;
    for point in cloud.iter() {
        write_point_record(dst, header, point)?;
    }
    Ok(())
}

fn read_point_record<R: Read>(src: &mut R, header: &LasHeader) -> Result<Point> {
    let raw_x = src.read_i32::<LittleEndian>()?;
    let raw_y = src.read_i32::<LittleEndian>()?;
    let raw_z = src.read_i32::<LittleEndian>()?;
    let position = Vector::new(
        (raw_x as f64 * header.x_scale_factor + header.x_offset) as f32,
        (raw_y as f64 * header.y_scale_factor + header.y_offset) as f32,
        (raw_z as f64 * header.z_scale_factor + header.z_offset) as f32,
    );

    let _intensity = src.read_u16::<LittleEndian>()?;
    let _return_info = src.read_u8()?;
    let _classification = src.read_u8()?;
    let _scan_angle = src.read_i8()?;
    let _user_data = src.read_u8()?;
    let _point_source_id = src.read_u16::<LittleEndian>()?;
    let mut consumed = 20usize;

    if header.has_gps_time() {
        let _gps_time = src.read_f64::<LittleEndian>()?;
        consumed += 8;
    }

    let mut color = Color::default();
    if header.has_color() {
        let r = src.read_u16::<LittleEndian>()?;
        let g = src.read_u16::<LittleEndian>()?;
        let b = src.read_u16::<LittleEndian>()?;
        // keep the high byte of each 16-bit channel
        color = Color::new((r >> 8) as u8, (g >> 8) as u8, (b >> 8) as u8);
        consumed += 6;
    }

    if header.has_nir() {
        let _nir = src.read_u16::<LittleEndian>()?;
        consumed += 2;
    }

    // wave packets and extended-record extras are not modeled; skip to the
    // next record so the declared record length stays authoritative
    let record_length = header.point_data_record_length as usize;
    skip_bytes(src, record_length.saturating_sub(consumed))?;

    Ok(Point::new(position, color))
}

fn write_point_record<W: Write>(dst: &mut W, header: &LasHeader, point: &Point) -> Result<()> {
    let raw_x = ((point.position.x as f64 - header.x_offset) / header.x_scale_factor) as i32;
    let raw_y = ((point.position.y as f64 - header.y_offset) / header.y_scale_factor) as i32;
    let raw_z = ((point.position.z as f64 - header.z_offset) / header.z_scale_factor) as i32;
    dst.write_i32::<LittleEndian>(raw_x)?;
    dst.write_i32::<LittleEndian>(raw_y)?;
    dst.write_i32::<LittleEndian>(raw_z)?;

    dst.write_u16::<LittleEndian>(0)?; // intensity
    dst.write_u8(0x11)?; // return 1 of 1
    dst.write_u8(1)?; // unclassified
    dst.write_i8(0)?; // scan angle
    dst.write_u8(0)?; // user data
    dst.write_u16::<LittleEndian>(0)?; // point source id
    let mut written = 20usize;

    if header.has_gps_time() {
        dst.write_f64::<LittleEndian>(0.0)?;
        written += 8;
    }

    if header.has_color() {
        // widen 8-bit channels into the high byte
        dst.write_u16::<LittleEndian>((point.color.r as u16) << 8)?;
        dst.write_u16::<LittleEndian>((point.color.g as u16) << 8)?;
        dst.write_u16::<LittleEndian>((point.color.b as u16) << 8)?;
        written += 6;
    }

    if header.has_nir() {
        dst.write_u16::<LittleEndian>(0)?;
        written += 2;
    }

    let record_length = header.point_data_record_length as usize;
    pad_bytes(dst, record_length.saturating_sub(written))?;
    Ok(())
}

fn skip_bytes<R: Read>(src: &mut R, mut n: usize) -> Result<()> {
    let mut scratch = [0u8; 64];
    while n > 0 {
        let take = n.min(scratch.len());
        src.read_exact(&mut scratch[..take])?;
        n -= take;
    }
    Ok(())
}

fn pad_bytes<W: Write>(dst: &mut W, mut n: usize) -> Result<()> {
    let zeros = [0u8; 64];
    while n > 0 {
        let take = n.min(zeros.len());
        dst.write_all(&zeros[..take])?;
        n -= take;
    }
    Ok(())
}
