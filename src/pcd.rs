//! PCD (Point Cloud Data) file reader and writer.
//!
//! Supports the `ascii`, `binary` and `binary_compressed` representations of
//! the PCD v0.7 container. The compressed payload uses the [crate::lzf]
//! codec and is laid out row-major, exactly like the plain binary payload.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, warn};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::lzf;
use crate::point::{Color, Point, PointCloud, Vector};
use crate::record::{self, FieldDescriptor, RecordLayout};

/// Payload representation selected by the `DATA` directive.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DataType {
    Ascii,
    Binary,
    BinaryCompressed,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Ascii => "ascii",
            DataType::Binary => "binary",
            DataType::BinaryCompressed => "binary_compressed",
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ascii" => Ok(DataType::Ascii),
            "binary" => Ok(DataType::Binary),
            "binary_compressed" => Ok(DataType::BinaryCompressed),
            other => Err(Error::UnsupportedDataType(other.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PCD header: the textual preamble preceding the payload.
#[derive(Clone, Debug)]
pub struct PcdHeader {
    pub version: String,
    pub fields: Vec<FieldDescriptor>,
    pub width: u32,
    pub height: u32,
    pub viewpoint: String,
    pub points: u32,
    pub data_type: DataType,
}

fn parse_directive<T: FromStr>(directive: &'static str, token: &str) -> Result<T> {
    token.parse().map_err(|_| Error::InvalidDirective {
        directive,
        value: token.to_string(),
    })
}

impl PcdHeader {
    /// Parses the line-oriented preamble from `src`.
    ///
    /// Comment lines (`#`) and blank lines are skipped, directives may appear
    /// in any order, and the `DATA` directive terminates the header. The four
    /// per-field directives must describe the same number of fields.
    pub fn read_from<R: BufRead>(src: &mut R) -> Result<PcdHeader> {
        let mut version = String::new();
        let mut names: Vec<String> = Vec::new();
        let mut sizes: Vec<u32> = Vec::new();
        let mut types: Vec<char> = Vec::new();
        let mut counts: Vec<u32> = Vec::new();
        let mut width = 0u32;
        let mut height = 0u32;
        let mut viewpoint = String::new();
        let mut points = 0u32;
        let mut data_type = None;

        let mut line = String::new();
        loop {
            line.clear();
            if src.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut tokens = trimmed.split_whitespace();
            let key = tokens.next().unwrap_or_default();
            match key {
                "VERSION" => {
                    version = tokens.next().unwrap_or_default().to_string();
                }
                "FIELDS" => {
                    names = tokens.map(str::to_string).collect();
                }
                "SIZE" => {
                    sizes = tokens
                        .map(|t| parse_directive("SIZE", t))
                        .collect::<Result<_>>()?;
                }
                "TYPE" => {
                    types = tokens
                        .map(|t| parse_directive("TYPE", t))
                        .collect::<Result<_>>()?;
                }
                "COUNT" => {
                    counts = tokens
                        .map(|t| parse_directive("COUNT", t))
                        .collect::<Result<_>>()?;
                }
                "WIDTH" => width = parse_directive("WIDTH", tokens.next().unwrap_or_default())?,
                "HEIGHT" => height = parse_directive("HEIGHT", tokens.next().unwrap_or_default())?,
                "VIEWPOINT" => viewpoint = tokens.collect::<Vec<_>>().join(" "),
                "POINTS" => points = parse_directive("POINTS", tokens.next().unwrap_or_default())?,
                "DATA" => {
                    data_type = Some(tokens.next().unwrap_or_default().parse::<DataType>()?);
                    break; // DATA is the last header line
                }
                other => debug!("ignoring unknown PCD directive {other}"),
            }
        }

        let data_type = data_type.ok_or(Error::MissingDirective("DATA"))?;

        if names.len() != sizes.len() || names.len() != types.len() || names.len() != counts.len() {
            return Err(Error::FieldCountMismatch {
                fields: names.len(),
                sizes: sizes.len(),
                types: types.len(),
                counts: counts.len(),
            });
        }
        let fields = names
            .into_iter()
            .zip(sizes)
            .zip(types)
            .zip(counts)
            .map(|(((name, size), data_type), count)| FieldDescriptor {
                name,
                size,
                data_type,
                count,
            })
            .collect();

        let header = PcdHeader {
            version,
            fields,
            width,
            height,
            viewpoint,
            points,
            data_type,
        };
        if !header.is_valid() {
            return Err(Error::InvalidHeader);
        }
        Ok(header)
    }

    /// Writes the preamble, ending with the `DATA` directive.
    pub fn write_to<W: Write>(&self, dst: &mut W) -> Result<()> {
        writeln!(dst, "# .PCD v{} - Point Cloud Data file format", self.version)?;
        writeln!(dst, "VERSION {}", self.version)?;
        write!(dst, "FIELDS")?;
        for field in &self.fields {
            write!(dst, " {}", field.name)?;
        }
        writeln!(dst)?;
        write!(dst, "SIZE")?;
        for field in &self.fields {
            write!(dst, " {}", field.size)?;
        }
        writeln!(dst)?;
        write!(dst, "TYPE")?;
        for field in &self.fields {
            write!(dst, " {}", field.data_type)?;
        }
        writeln!(dst)?;
        write!(dst, "COUNT")?;
        for field in &self.fields {
            write!(dst, " {}", field.count)?;
        }
        writeln!(dst)?;
        writeln!(dst, "WIDTH {}", self.width)?;
        writeln!(dst, "HEIGHT {}", self.height)?;
        writeln!(dst, "VIEWPOINT {}", self.viewpoint)?;
        writeln!(dst, "POINTS {}", self.points)?;
        writeln!(dst, "DATA {}", self.data_type)?;
        Ok(())
    }

    /// Synthesizes the fixed x/y/z/rgb schema for `cloud`.
    pub fn for_cloud(cloud: &PointCloud, data_type: DataType) -> PcdHeader {
        let points = cloud.len() as u32;
        PcdHeader {
            version: "0.7".to_string(),
            fields: vec![
                FieldDescriptor::new("x", 4, 'F', 1),
                FieldDescriptor::new("y", 4, 'F', 1),
                FieldDescriptor::new("z", 4, 'F', 1),
                FieldDescriptor::new("rgb", 4, 'U', 1),
            ],
            width: points,
            height: 1,
            viewpoint: "0 0 0 1 0 0 0".to_string(),
            points,
            data_type,
        }
    }

    /// True when the header describes a loadable cloud.
    pub fn is_valid(&self) -> bool {
        !self.fields.is_empty() && self.width > 0 && self.points > 0
    }

    /// True when x, y and z fields are all declared.
    pub fn has_position(&self) -> bool {
        self.field_index("x").is_some()
            && self.field_index("y").is_some()
            && self.field_index("z").is_some()
    }

    /// True when a packed rgb field is declared.
    pub fn has_color(&self) -> bool {
        self.field_index("rgb").is_some()
    }

    /// Index of the field named `name` in declared order.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }
}

/// Loads a PCD file from `path`.
pub fn load_pcd<P: AsRef<Path>>(path: P) -> Result<(PcdHeader, PointCloud)> {
    let mut src = BufReader::new(File::open(path)?);
    read_pcd_from(&mut src)
}

/// Reads a header and its payload from any buffered source.
pub fn read_pcd_from<R: BufRead>(src: &mut R) -> Result<(PcdHeader, PointCloud)> {
    let header = PcdHeader::read_from(src)?;
    if !header.has_position() {
        return Err(Error::MissingPositionFields);
    }

    let mut cloud = PointCloud::with_capacity(header.points as usize);
    cloud.width = header.width;
    cloud.height = header.height;

    match header.data_type {
        DataType::Ascii => read_ascii_payload(src, &header, &mut cloud)?,
        DataType::Binary => {
            let layout = RecordLayout::new(&header.fields);
            let expected = header.points as usize * layout.stride();
            let mut data = Vec::new();
            src.read_to_end(&mut data)?;
            if data.len() < expected {
                return Err(Error::PayloadSizeMismatch {
                    expected,
                    actual: data.len(),
                });
            }
            parse_binary_payload(&data, &header, &mut cloud)?;
        }
        DataType::BinaryCompressed => {
            let compressed_len = src.read_u32::<LittleEndian>()? as usize;
            let uncompressed_len = src.read_u32::<LittleEndian>()? as usize;
            let mut compressed = vec![0u8; compressed_len];
            src.read_exact(&mut compressed)?;
            let data = lzf::decompress(&compressed, uncompressed_len)?;
            // decompressed records are row-major, identical to DATA binary
            parse_binary_payload(&data, &header, &mut cloud)?;
        }
    }

    debug!(
        "loaded {} of {} points ({})",
        cloud.len(),
        header.points,
        header.data_type
    );
    Ok((header, cloud))
}

fn read_ascii_payload<R: BufRead>(
    src: &mut R,
    header: &PcdHeader,
    cloud: &mut PointCloud,
) -> Result<()> {
    let x_index = header.field_index("x").ok_or(Error::MissingPositionFields)?;
    let y_index = header.field_index("y").ok_or(Error::MissingPositionFields)?;
    let z_index = header.field_index("z").ok_or(Error::MissingPositionFields)?;
    let rgb_index = header.field_index("rgb");

    let mut line = String::new();
    for _ in 0..header.points {
        line.clear();
        if src.read_line(&mut line)? == 0 {
            break;
        }
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() < header.fields.len() {
            warn!("skipping short PCD line: {:?}", line.trim_end());
            continue;
        }

        let Some(position) = parse_ascii_position(&values, x_index, y_index, z_index) else {
            warn!("skipping unparseable PCD line: {:?}", line.trim_end());
            continue;
        };

        let mut color = Color::default();
        if let Some(rgb_index) = rgb_index {
            match values[rgb_index].parse::<u32>() {
                Ok(packed) => color = Color::from_packed(packed),
                Err(_) => {
                    warn!("skipping PCD line with bad rgb value: {:?}", line.trim_end());
                    continue;
                }
            }
        }

        if !position.is_finite() {
            cloud.is_dense = false;
            continue;
        }
        cloud.push(Point::new(position, color));
    }
    Ok(())
}

fn parse_ascii_position(
    values: &[&str],
    x_index: usize,
    y_index: usize,
    z_index: usize,
) -> Option<Vector> {
    Some(Vector::new(
        values[x_index].parse().ok()?,
        values[y_index].parse().ok()?,
        values[z_index].parse().ok()?,
    ))
}

fn parse_binary_payload(data: &[u8], header: &PcdHeader, cloud: &mut PointCloud) -> Result<()> {
    let layout = RecordLayout::new(&header.fields);
    let x_offset = field_offset(header, &layout, "x")?;
    let y_offset = field_offset(header, &layout, "y")?;
    let z_offset = field_offset(header, &layout, "z")?;
    let rgb_offset = header
        .field_index("rgb")
        .and_then(|index| layout.field_offset(index));

    let expected = header.points as usize * layout.stride();
    if data.len() < expected {
        return Err(Error::PayloadSizeMismatch {
            expected,
            actual: data.len(),
        });
    }

    for i in 0..header.points as usize {
        let base = i * layout.stride();
        let position = Vector::new(
            record::read_f32(data, base + x_offset)?,
            record::read_f32(data, base + y_offset)?,
            record::read_f32(data, base + z_offset)?,
        );
        let color = match rgb_offset {
            Some(offset) => Color::from_packed(record::read_u32(data, base + offset)?),
            None => Color::default(),
        };

        if !position.is_finite() {
            cloud.is_dense = false;
            continue;
        }
        cloud.push(Point::new(position, color));
    }
    Ok(())
}

fn field_offset(header: &PcdHeader, layout: &RecordLayout, name: &str) -> Result<usize> {
    header
        .field_index(name)
        .and_then(|index| layout.field_offset(index))
        .ok_or(Error::MissingPositionFields)
}

/// Saves `cloud` to `path` in the representation named by `header.data_type`.
pub fn save_pcd<P: AsRef<Path>>(path: P, header: &PcdHeader, cloud: &PointCloud) -> Result<()> {
    let mut dst = BufWriter::new(File::create(path)?);
    write_pcd_to(&mut dst, header, cloud)?;
    dst.flush()?;
    Ok(())
}

/// Writes a header and its payload to any sink.
pub fn write_pcd_to<W: Write>(dst: &mut W, header: &PcdHeader, cloud: &PointCloud) -> Result<()> {
    if header.points as usize != cloud.len() {
        return Err(Error::PayloadSizeMismatch {
            expected: header.points as usize,
            actual: cloud.len(),
        });
    }
    header.write_to(dst)?;

    match header.data_type {
        DataType::Ascii => {
            for point in cloud.iter() {
                writeln!(
                    dst,
                    "{} {} {} {}",
                    point.position.x,
                    point.position.y,
                    point.position.z,
                    point.color.to_packed()
                )?;
            }
        }
        DataType::Binary => {
            let data = encode_binary_payload(header, cloud)?;
            dst.write_all(&data)?;
        }
        DataType::BinaryCompressed => {
            // the record buffer is compressed row-major, as it is parsed back
            let data = encode_binary_payload(header, cloud)?;
            let compressed = lzf::compress(&data);
            dst.write_u32::<LittleEndian>(compressed.len() as u32)?;
            dst.write_u32::<LittleEndian>(data.len() as u32)?;
            dst.write_all(&compressed)?;
        }
    }
    Ok(())
}

fn encode_binary_payload(header: &PcdHeader, cloud: &PointCloud) -> Result<Vec<u8>> {
    let layout = RecordLayout::new(&header.fields);
    let x_offset = field_offset(header, &layout, "x")?;
    let y_offset = field_offset(header, &layout, "y")?;
    let z_offset = field_offset(header, &layout, "z")?;
    let rgb_offset = header
        .field_index("rgb")
        .and_then(|index| layout.field_offset(index));

    let mut data = vec![0u8; cloud.len() * layout.stride()];
    for (i, point) in cloud.iter().enumerate() {
        let base = i * layout.stride();
        record::write_f32(&mut data, base + x_offset, point.position.x)?;
        record::write_f32(&mut data, base + y_offset, point.position.y)?;
        record::write_f32(&mut data, base + z_offset, point.position.z)?;
        if let Some(offset) = rgb_offset {
            record::write_u32(&mut data, base + offset, point.color.to_packed())?;
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_cloud() -> PointCloud {
        let mut cloud = PointCloud::default();
        cloud.push(Point::new(Vector::new(1.0, 2.0, 3.0), Color::new(255, 0, 0)));
        cloud.push(Point::new(Vector::new(4.0, 5.0, 6.0), Color::new(0, 255, 0)));
        cloud.push(Point::new(Vector::new(7.0, 8.0, 9.0), Color::new(0, 0, 255)));
        cloud.width = 3;
        cloud.height = 1;
        cloud
    }

    fn round_trip(data_type: DataType) -> (PcdHeader, PointCloud) {
        let cloud = sample_cloud();
        let header = PcdHeader::for_cloud(&cloud, data_type);
        let mut buffer = Vec::new();
        write_pcd_to(&mut buffer, &header, &cloud).unwrap();
        read_pcd_from(&mut Cursor::new(buffer)).unwrap()
    }

    #[test]
    fn ascii_round_trip() {
        let (header, cloud) = round_trip(DataType::Ascii);
        assert!(header.is_valid());
        assert_eq!(cloud, sample_cloud());
    }

    #[test]
    fn binary_round_trip() {
        let (header, cloud) = round_trip(DataType::Binary);
        assert_eq!(header.data_type, DataType::Binary);
        assert_eq!(cloud, sample_cloud());
    }

    #[test]
    fn binary_compressed_round_trip() {
        let (_, cloud) = round_trip(DataType::BinaryCompressed);
        assert_eq!(cloud, sample_cloud());
    }

    // PCL stores the compressed payload column-major; this codec writes and
    // reads it row-major, so its own files always round-trip.
    #[test]
    fn binary_compressed_payload_is_row_major() {
        let cloud = sample_cloud();
        let header = PcdHeader::for_cloud(&cloud, DataType::BinaryCompressed);
        let data = encode_binary_payload(&header, &cloud).unwrap();
        let layout = RecordLayout::new(&header.fields);
        // second record starts one stride in, with its x value first
        assert_eq!(record::read_f32(&data, layout.stride()).unwrap(), 4.0);
    }

    #[test]
    fn header_validity() {
        let cloud = sample_cloud();
        let mut header = PcdHeader::for_cloud(&cloud, DataType::Ascii);
        assert!(header.is_valid());
        header.width = 0;
        assert!(!header.is_valid());
        header.width = 100;
        header.points = 0;
        assert!(!header.is_valid());
        header.points = 100;
        header.fields.clear();
        assert!(!header.is_valid());
    }

    #[test]
    fn unknown_data_keyword_is_rejected() {
        let text = "VERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\n\
                    WIDTH 1\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 1\nDATA base64\n";
        assert!(matches!(
            read_pcd_from(&mut Cursor::new(text)),
            Err(Error::UnsupportedDataType(_))
        ));
    }

    #[test]
    fn field_directive_mismatch_is_rejected() {
        let text = "VERSION 0.7\nFIELDS x y z\nSIZE 4 4\nTYPE F F F\nCOUNT 1 1 1\n\
                    WIDTH 1\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 1\nDATA ascii\n";
        assert!(matches!(
            read_pcd_from(&mut Cursor::new(text)),
            Err(Error::FieldCountMismatch { sizes: 2, .. })
        ));
    }

    #[test]
    fn short_ascii_lines_are_skipped() {
        let text = "VERSION 0.7\nFIELDS x y z rgb\nSIZE 4 4 4 4\nTYPE F F F U\nCOUNT 1 1 1 1\n\
                    WIDTH 3\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 3\nDATA ascii\n\
                    1.0 2.0 3.0 0\n4.0 5.0\n7.0 8.0 9.0 255\n";
        let (_, cloud) = read_pcd_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.points[1].position.z, 9.0);
        assert!(cloud.is_dense);
    }

    #[test]
    fn non_finite_points_clear_the_dense_flag() {
        let text = "VERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\n\
                    WIDTH 3\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 3\nDATA ascii\n\
                    1.0 2.0 3.0\nnan 5.0 6.0\n7.0 8.0 9.0\n";
        let (_, cloud) = read_pcd_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(cloud.len(), 2);
        assert!(!cloud.is_dense);
    }

    #[test]
    fn truncated_binary_payload_is_rejected() {
        let cloud = sample_cloud();
        let header = PcdHeader::for_cloud(&cloud, DataType::Binary);
        let mut buffer = Vec::new();
        write_pcd_to(&mut buffer, &header, &cloud).unwrap();
        buffer.truncate(buffer.len() - 8);
        assert!(matches!(
            read_pcd_from(&mut Cursor::new(buffer)),
            Err(Error::PayloadSizeMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_compressed_payload_is_rejected() {
        let cloud = sample_cloud();
        let header = PcdHeader::for_cloud(&cloud, DataType::BinaryCompressed);
        let mut buffer = Vec::new();
        write_pcd_to(&mut buffer, &header, &cloud).unwrap();
        let last = buffer.len() - 1;
        buffer.truncate(last);
        assert!(read_pcd_from(&mut Cursor::new(buffer)).is_err());
    }

    #[test]
    fn header_without_position_fields_is_rejected() {
        let text = "VERSION 0.7\nFIELDS intensity\nSIZE 4\nTYPE F\nCOUNT 1\n\
                    WIDTH 1\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 1\nDATA ascii\n1.0\n";
        assert!(matches!(
            read_pcd_from(&mut Cursor::new(text)),
            Err(Error::MissingPositionFields)
        ));
    }
}
