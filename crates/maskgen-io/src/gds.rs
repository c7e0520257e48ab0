//! GDS-II binary stream writer and reader.
//!
//! Each record: [2-byte length][2-byte record type][payload], big-endian.
//! Record order: HEADER, BGNLIB, LIBNAME, UNITS, then per structure
//! BGNSTR, STRNAME, elements (BOUNDARY/SREF ... ENDEL), ENDSTR, and finally
//! ENDLIB.

use std::io::{self, Read, Write};
use thiserror::Error;

use maskgen_core::cell::{Cell, CellInstance, Transform};
use maskgen_core::geometry::{GeomPrimitive, Point, Polygon, Rect};
use maskgen_core::layer::LayerSpec;
use maskgen_core::library::{Library, Units};
use maskgen_core::CoreError;

// ── GDS-II Record Types ──────────────────────────────────────────────

#[allow(dead_code)]
mod record_type {
    pub const HEADER: u16     = 0x0002;
    pub const BGNLIB: u16     = 0x0102;
    pub const LIBNAME: u16    = 0x0206;
    pub const UNITS: u16      = 0x0305;
    pub const ENDLIB: u16     = 0x0400;
    pub const BGNSTR: u16     = 0x0502;
    pub const STRNAME: u16    = 0x0606;
    pub const ENDSTR: u16     = 0x0700;
    pub const BOUNDARY: u16   = 0x0800;
    pub const PATH: u16       = 0x0900;
    pub const SREF: u16       = 0x0A00;
    pub const AREF: u16       = 0x0B00;
    pub const TEXT: u16       = 0x0C00;
    pub const LAYER: u16      = 0x0D02;
    pub const DATATYPE: u16   = 0x0E02;
    pub const XY: u16         = 0x1003;
    pub const ENDEL: u16      = 0x1100;
    pub const SNAME: u16      = 0x1206;
    pub const NODE: u16       = 0x1500;
    pub const STRANS: u16     = 0x1A01;
    pub const MAG: u16        = 0x1B05;
    pub const ANGLE: u16      = 0x1C05;
    pub const BOX: u16        = 0x2D00;
    pub const BOXTYPE: u16    = 0x2E02;
}

/// Largest point count of one XY record: (65535 - 4) / 8.
pub const MAX_XY_POINTS: usize = 8191;

/// BGNLIB/BGNSTR timestamp written when none is supplied.
pub const DEFAULT_TIMESTAMP: [i16; 6] = [2024, 1, 1, 0, 0, 0];

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum GdsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid GDS-II record at offset {offset}: {message}")]
    InvalidRecord { offset: u64, message: String },

    #[error("Unexpected record type 0x{record_type:04X}, expected 0x{expected:04X}")]
    UnexpectedRecord { record_type: u16, expected: u16 },

    #[error("Coordinate {value} does not fit a 32-bit GDS-II integer")]
    CoordinateOverflow { value: f64 },

    #[error("Shape with {points} points exceeds the GDS-II limit of {limit}", limit = MAX_XY_POINTS)]
    TooManyPoints { points: usize },

    #[error("Layer {layer}/{datatype} exceeds the GDS-II maximum of 32767")]
    LayerOutOfRange { layer: u16, datatype: u16 },

    #[error("String of {0} bytes is too long for a GDS-II record")]
    StringTooLong(usize),

    #[error("Cell '{0}' referenced but not defined")]
    UndefinedCell(String),

    #[error(transparent)]
    Layout(CoreError),
}

impl From<CoreError> for GdsError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UndefinedCell(name) => GdsError::UndefinedCell(name),
            other => GdsError::Layout(other),
        }
    }
}

// ── GDS-II Record ─────────────────────────────────────────────────────

#[derive(Debug)]
struct GdsRecord {
    record_type: u16,
    data: Vec<u8>,
}

impl GdsRecord {
    fn as_i16_vec(&self) -> Vec<i16> {
        self.data
            .chunks_exact(2)
            .map(|c| i16::from_be_bytes([c[0], c[1]]))
            .collect()
    }

    fn as_i32_vec(&self) -> Vec<i32> {
        self.data
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn as_string(&self) -> String {
        let s: String = self.data.iter().map(|&b| b as char).collect();
        s.trim_end_matches('\0').to_string()
    }

    fn as_f64_vec(&self) -> Vec<f64> {
        self.data
            .chunks_exact(8)
            .map(|c| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(c);
                gds_real8_to_f64(&bytes)
            })
            .collect()
    }

    fn first_i16(&self) -> Option<i16> {
        self.as_i16_vec().first().copied()
    }

    fn first_f64(&self) -> Option<f64> {
        self.as_f64_vec().first().copied()
    }
}

/// Convert GDS-II excess-64 real format to IEEE 754 f64.
fn gds_real8_to_f64(bytes: &[u8; 8]) -> f64 {
    if bytes.iter().all(|&b| b == 0) {
        return 0.0;
    }

    let sign = if bytes[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (bytes[0] & 0x7F) as i32 - 64;

    let mut mantissa: u64 = 0;
    for &b in &bytes[1..] {
        mantissa = (mantissa << 8) | (b as u64);
    }

    let mantissa_f = mantissa as f64 / (1u64 << 56) as f64;
    sign * mantissa_f * 16.0_f64.powi(exponent)
}

/// Convert IEEE 754 f64 to GDS-II excess-64 real format.
fn f64_to_gds_real8(value: f64) -> [u8; 8] {
    if value == 0.0 {
        return [0u8; 8];
    }

    let sign_bit: u8 = if value < 0.0 { 0x80 } else { 0x00 };
    let mut val = value.abs();

    // Normalize so that 1/16 <= mantissa < 1
    let mut exponent: i32 = 0;
    while val >= 1.0 && exponent < 63 {
        val /= 16.0;
        exponent += 1;
    }
    while val < 1.0 / 16.0 && exponent > -64 {
        val *= 16.0;
        exponent -= 1;
    }

    let mantissa = (val * (1u64 << 56) as f64).round() as u64;
    let mantissa = mantissa.min((1u64 << 56) - 1);
    let exp_byte = sign_bit | ((exponent + 64) as u8 & 0x7F);

    let mut result = [0u8; 8];
    result[0] = exp_byte;
    result[1..].copy_from_slice(&mantissa.to_be_bytes()[1..]);
    result
}

// ── GDS-II Writer ─────────────────────────────────────────────────────

pub struct GdsWriter<W: Write> {
    writer: W,
    timestamp: [i16; 6],
}

impl<W: Write> GdsWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            timestamp: DEFAULT_TIMESTAMP,
        }
    }

    /// Set the modification/access time written to BGNLIB and BGNSTR
    /// as `[year, month, day, hour, minute, second]`.
    pub fn with_timestamp(mut self, timestamp: [i16; 6]) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Write a Library as a GDS-II stream.
    pub fn write(&mut self, lib: &Library) -> Result<(), GdsError> {
        lib.validate_references()?;

        self.write_i16_record(record_type::HEADER, &[600])?;
        let stamp = self.double_timestamp();
        self.write_i16_record(record_type::BGNLIB, &stamp)?;
        self.write_string_record(record_type::LIBNAME, &lib.name)?;
        self.write_units(&lib.units)?;

        for cell in lib.cells() {
            self.write_cell(cell, &lib.units)?;
        }

        self.write_record(record_type::ENDLIB, &[])?;
        self.writer.flush()?;
        log::info!(
            "Wrote GDS-II library '{}': {} cells, {} shapes",
            lib.name,
            lib.cell_count(),
            lib.shape_count()
        );
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn double_timestamp(&self) -> [i16; 12] {
        let mut stamp = [0i16; 12];
        stamp[..6].copy_from_slice(&self.timestamp);
        stamp[6..].copy_from_slice(&self.timestamp);
        stamp
    }

    fn write_record(&mut self, record_type: u16, data: &[u8]) -> Result<(), GdsError> {
        let total_len = u16::try_from(data.len() + 4).map_err(|_| GdsError::InvalidRecord {
            offset: 0,
            message: format!("payload of {} bytes exceeds record size", data.len()),
        })?;
        self.writer.write_all(&total_len.to_be_bytes())?;
        self.writer.write_all(&record_type.to_be_bytes())?;
        if !data.is_empty() {
            self.writer.write_all(data)?;
        }
        Ok(())
    }

    fn write_i16_record(&mut self, record_type: u16, values: &[i16]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_i32_record(&mut self, record_type: u16, values: &[i32]) -> Result<(), GdsError> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_string_record(&mut self, record_type: u16, s: &str) -> Result<(), GdsError> {
        let mut data: Vec<u8> = s.bytes().collect();
        // GDS strings must be even length
        if data.len() % 2 != 0 {
            data.push(0);
        }
        if data.len() > u16::MAX as usize - 4 {
            return Err(GdsError::StringTooLong(data.len()));
        }
        self.write_record(record_type, &data)
    }

    fn write_real8_record(&mut self, record_type: u16, values: &[f64]) -> Result<(), GdsError> {
        let data: Vec<u8> = values
            .iter()
            .flat_map(|v| f64_to_gds_real8(*v))
            .collect();
        self.write_record(record_type, &data)
    }

    fn write_units(&mut self, units: &Units) -> Result<(), GdsError> {
        // db unit in user units, db unit in meters
        let db_in_user = units.precision / units.user_unit;
        self.write_real8_record(record_type::UNITS, &[db_in_user, units.precision])
    }

    fn write_cell(&mut self, cell: &Cell, units: &Units) -> Result<(), GdsError> {
        let stamp = self.double_timestamp();
        self.write_i16_record(record_type::BGNSTR, &stamp)?;
        self.write_string_record(record_type::STRNAME, &cell.name)?;

        for geom in &cell.geometries {
            self.write_boundary(geom, units)?;
        }

        for inst in &cell.instances {
            self.write_sref(inst, units)?;
        }

        self.write_record(record_type::ENDSTR, &[])?;
        log::debug!(
            "GDS-II cell '{}': {} shapes, {} instances",
            cell.name,
            cell.geometry_count(),
            cell.instance_count()
        );
        Ok(())
    }

    fn write_boundary(&mut self, geom: &GeomPrimitive, units: &Units) -> Result<(), GdsError> {
        let mut vertices = geom.vertices();
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        // Closed boundary repeats the first point
        if vertices.len() + 1 > MAX_XY_POINTS {
            return Err(GdsError::TooManyPoints {
                points: vertices.len() + 1,
            });
        }

        let mut coords = Vec::with_capacity((vertices.len() + 1) * 2);
        for p in vertices.iter().chain(vertices.first()) {
            coords.push(to_gds_coord(p.x, units)?);
            coords.push(to_gds_coord(p.y, units)?);
        }

        let layer = geom.layer();
        let out_of_range = |_| GdsError::LayerOutOfRange {
            layer: layer.layer,
            datatype: layer.datatype,
        };
        let layer_number = i16::try_from(layer.layer).map_err(out_of_range)?;
        let datatype = i16::try_from(layer.datatype).map_err(out_of_range)?;
        self.write_record(record_type::BOUNDARY, &[])?;
        self.write_i16_record(record_type::LAYER, &[layer_number])?;
        self.write_i16_record(record_type::DATATYPE, &[datatype])?;
        self.write_i32_record(record_type::XY, &coords)?;
        self.write_record(record_type::ENDEL, &[])?;
        Ok(())
    }

    fn write_sref(&mut self, inst: &CellInstance, units: &Units) -> Result<(), GdsError> {
        let t = &inst.transform;

        self.write_record(record_type::SREF, &[])?;
        self.write_string_record(record_type::SNAME, &inst.cell_name)?;

        if !t.is_translation() {
            let strans: i16 = if t.mirror_x { i16::MIN } else { 0 }; // 0x8000
            self.write_i16_record(record_type::STRANS, &[strans])?;
            if t.scale != 1.0 {
                self.write_real8_record(record_type::MAG, &[t.scale])?;
            }
            if t.rotation != 0.0 {
                self.write_real8_record(record_type::ANGLE, &[t.rotation])?;
            }
        }

        let x = to_gds_coord(t.offset.x, units)?;
        let y = to_gds_coord(t.offset.y, units)?;
        self.write_i32_record(record_type::XY, &[x, y])?;

        self.write_record(record_type::ENDEL, &[])?;
        Ok(())
    }
}

fn to_gds_coord(value: f64, units: &Units) -> Result<i32, GdsError> {
    let dbu = units.to_dbu(value);
    if dbu >= i32::MIN as f64 && dbu <= i32::MAX as f64 {
        Ok(dbu as i32)
    } else {
        Err(GdsError::CoordinateOverflow { value })
    }
}

// ── GDS-II Reader ─────────────────────────────────────────────────────

pub struct GdsReader<R: Read> {
    reader: R,
    offset: u64,
    units: Units,
}

impl<R: Read> GdsReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            units: Units::default(),
        }
    }

    /// Read the entire GDS-II stream into a Library.
    pub fn read(&mut self) -> Result<Library, GdsError> {
        self.read_header()?;
        let lib = self.read_lib()?;
        lib.validate_references()?;
        Ok(lib)
    }

    fn read_record(&mut self) -> Result<Option<GdsRecord>, GdsError> {
        let mut len_buf = [0u8; 2];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(GdsError::Io(e)),
        }

        let total_len = u16::from_be_bytes(len_buf) as usize;
        if total_len < 4 {
            return Err(GdsError::InvalidRecord {
                offset: self.offset,
                message: format!("Record length {} is too small", total_len),
            });
        }

        let mut body = vec![0u8; total_len - 2];
        self.reader.read_exact(&mut body).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => GdsError::InvalidRecord {
                offset: self.offset,
                message: format!("Record of {} bytes is truncated", total_len),
            },
            _ => GdsError::Io(e),
        })?;
        let record_type = u16::from_be_bytes([body[0], body[1]]);
        let data = body.split_off(2);
        self.offset += total_len as u64;

        Ok(Some(GdsRecord { record_type, data }))
    }

    /// Next record, treating end of stream as a truncated file.
    fn expect_record(&mut self) -> Result<GdsRecord, GdsError> {
        let offset = self.offset;
        self.read_record()?.ok_or(GdsError::InvalidRecord {
            offset,
            message: "Unexpected end of stream".into(),
        })
    }

    fn read_header(&mut self) -> Result<(), GdsError> {
        let rec = self.read_record()?.ok_or(GdsError::InvalidRecord {
            offset: 0,
            message: "Empty file".into(),
        })?;

        if rec.record_type != record_type::HEADER {
            return Err(GdsError::UnexpectedRecord {
                record_type: rec.record_type,
                expected: record_type::HEADER,
            });
        }

        if let Some(version) = rec.first_i16() {
            log::debug!("GDS-II version: {}", version);
        }

        Ok(())
    }

    fn read_lib(&mut self) -> Result<Library, GdsError> {
        let mut lib = Library::new("library");

        loop {
            let rec = self.expect_record()?;
            match rec.record_type {
                record_type::BGNLIB => {}
                record_type::LIBNAME => {
                    lib.name = rec.as_string();
                }
                record_type::UNITS => {
                    let units = rec.as_f64_vec();
                    if units.len() >= 2 {
                        let (db_in_user, db_in_m) = (units[0], units[1]);
                        self.units = Units::new(db_in_m / db_in_user, db_in_m)?;
                        lib.units = self.units;
                    }
                }
                record_type::BGNSTR => {
                    let cell = self.read_structure()?;
                    lib.add_cell(cell)?;
                }
                record_type::ENDLIB => break,
                other => {
                    log::warn!("Skipping GDS-II record 0x{:04X} at library level", other);
                }
            }
        }

        log::info!("Read GDS-II library '{}': {} cells", lib.name, lib.cell_count());
        Ok(lib)
    }

    fn read_structure(&mut self) -> Result<Cell, GdsError> {
        let mut cell = Cell::new("unnamed");

        loop {
            let rec = self.expect_record()?;
            match rec.record_type {
                record_type::STRNAME => {
                    cell.name = rec.as_string();
                }
                record_type::BOUNDARY | record_type::BOX => {
                    if let Some(geom) = self.read_boundary()? {
                        cell.add_geometry(geom)?;
                    }
                }
                record_type::SREF => {
                    if let Some(inst) = self.read_sref()? {
                        cell.add_instance(inst);
                    }
                }
                record_type::PATH | record_type::TEXT | record_type::NODE | record_type::AREF => {
                    log::warn!(
                        "Skipping unsupported element 0x{:04X} in cell '{}'",
                        rec.record_type,
                        cell.name
                    );
                    self.skip_to_endel()?;
                }
                record_type::ENDSTR => break,
                _ => {}
            }
        }

        Ok(cell)
    }

    fn read_points(&self, rec: &GdsRecord) -> Vec<Point> {
        rec.as_i32_vec()
            .chunks_exact(2)
            .map(|pair| {
                Point::new(
                    self.units.from_dbu(pair[0] as i64),
                    self.units.from_dbu(pair[1] as i64),
                )
            })
            .collect()
    }

    /// BOUNDARY or BOX; BOXTYPE stands in for DATATYPE.
    fn read_boundary(&mut self) -> Result<Option<GeomPrimitive>, GdsError> {
        let mut layer = LayerSpec::new(0, 0);
        let mut points: Vec<Point> = Vec::new();

        loop {
            let rec = self.expect_record()?;
            match rec.record_type {
                record_type::LAYER => {
                    if let Some(v) = rec.first_i16() {
                        layer.layer = v as u16;
                    }
                }
                record_type::DATATYPE | record_type::BOXTYPE => {
                    if let Some(v) = rec.first_i16() {
                        layer.datatype = v as u16;
                    }
                }
                record_type::XY => points = self.read_points(&rec),
                record_type::ENDEL => break,
                _ => {}
            }
        }

        // GDS boundaries repeat the first point; remove it
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        if points.is_empty() {
            return Ok(None);
        }

        let poly = Polygon::new(layer, points);
        if poly.is_axis_aligned_rect() {
            if let Some(bbox) = poly.bbox() {
                return Ok(Some(GeomPrimitive::Rect(Rect::from_bbox(layer, &bbox))));
            }
        }

        Ok(Some(GeomPrimitive::Polygon(poly)))
    }

    fn read_sref(&mut self) -> Result<Option<CellInstance>, GdsError> {
        let mut cell_name = String::new();
        let mut transform = Transform::default();

        loop {
            let rec = self.expect_record()?;
            match rec.record_type {
                record_type::SNAME => {
                    cell_name = rec.as_string();
                }
                record_type::STRANS => {
                    if let Some(v) = rec.first_i16() {
                        transform.mirror_x = (v as u16 & 0x8000) != 0;
                    }
                }
                record_type::MAG => {
                    if let Some(v) = rec.first_f64() {
                        transform.scale = v;
                    }
                }
                record_type::ANGLE => {
                    if let Some(v) = rec.first_f64() {
                        transform.rotation = v;
                    }
                }
                record_type::XY => {
                    if let Some(p) = self.read_points(&rec).first() {
                        transform.offset = *p;
                    }
                }
                record_type::ENDEL => break,
                _ => {}
            }
        }

        if cell_name.is_empty() {
            return Ok(None);
        }

        Ok(Some(CellInstance::new(&cell_name, transform)))
    }

    fn skip_to_endel(&mut self) -> Result<(), GdsError> {
        loop {
            if self.expect_record()?.record_type == record_type::ENDEL {
                return Ok(());
            }
        }
    }
}
