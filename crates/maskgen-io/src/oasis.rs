//! OASIS (SEMI P39) stream writer and verification reader.
//!
//! The writer emits one CELL record per cell (referenced by name), a
//! RECTANGLE per axis-aligned rectangle, a POLYGON per other shape and a
//! PLACEMENT per instance. Modal variables suppress repeated layer,
//! datatype, size and position fields and are reset at every CELL.
//! Table offsets live in the START record and are all zero. The END
//! record is padded to 256 bytes and carries no validation signature.
//!
//! The reader accepts what the writer produces; any other record is an
//! `UnsupportedRecord` error.

use std::io::{self, Read, Write};
use thiserror::Error;

use maskgen_core::cell::{Cell, CellInstance, Transform};
use maskgen_core::geometry::{GeomPrimitive, Point, Polygon, Rect};
use maskgen_core::layer::LayerSpec;
use maskgen_core::library::{Library, Units};
use maskgen_core::CoreError;

pub const MAGIC: &[u8; 13] = b"%SEMI-OASIS\r\n";

const VERSION: &str = "1.0";
const END_RECORD_LEN: usize = 256;

#[allow(dead_code)]
mod record_id {
    pub const PAD: u64          = 0;
    pub const START: u64        = 1;
    pub const END: u64          = 2;
    pub const CELL_REFNUM: u64  = 13;
    pub const CELL_NAME: u64    = 14;
    pub const XYABSOLUTE: u64   = 15;
    pub const XYRELATIVE: u64   = 16;
    pub const PLACEMENT: u64    = 17;
    pub const RECTANGLE: u64    = 20;
    pub const POLYGON: u64      = 21;
}

/// Point-list type for general (any-angle) deltas.
const POINT_LIST_GDELTA: u64 = 4;

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum OasisError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Missing OASIS magic string")]
    BadMagic,

    #[error("Unsupported OASIS record {0}")]
    UnsupportedRecord(u64),

    #[error("Unsupported point-list type {0}")]
    UnsupportedPointList(u64),

    #[error("Unsupported instance transform on '{cell}': {reason}")]
    UnsupportedTransform { cell: String, reason: String },

    #[error("Modal variable '{0}' used before it was set")]
    ModalUndefined(&'static str),

    #[error("Coordinate {value} does not fit a 64-bit OASIS integer")]
    CoordinateOverflow { value: f64 },

    #[error("Invalid OASIS data: {0}")]
    Invalid(String),

    #[error(transparent)]
    Layout(#[from] CoreError),
}

// ── Primitive encoding ───────────────────────────────────────────────

fn write_unsigned<W: Write>(w: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            return w.write_all(&[byte]);
        }
        w.write_all(&[byte | 0x80])?;
    }
}

/// Sign in bit 0, magnitude above it.
fn write_signed<W: Write>(w: &mut W, value: i64) -> io::Result<()> {
    let magnitude = value.unsigned_abs();
    let sign = u64::from(value < 0);
    write_unsigned(w, (magnitude << 1) | sign)
}

fn write_bytes_string<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_unsigned(w, bytes.len() as u64)?;
    w.write_all(bytes)
}

/// Whole numbers use real type 0/1, everything else an IEEE double (type 7).
fn write_real<W: Write>(w: &mut W, value: f64) -> io::Result<()> {
    if value.fract() == 0.0 && value.abs() < u32::MAX as f64 {
        let kind = if value < 0.0 { 1 } else { 0 };
        write_unsigned(w, kind)?;
        write_unsigned(w, value.abs() as u64)
    } else {
        write_unsigned(w, 7)?;
        w.write_all(&value.to_le_bytes())
    }
}

/// A g-delta in its second form: `|dx|`, x sign and a marker bit, then `dy`.
fn write_g_delta<W: Write>(w: &mut W, dx: i64, dy: i64) -> io::Result<()> {
    let sign_x = u64::from(dx < 0);
    write_unsigned(w, (dx.unsigned_abs() << 2) | (sign_x << 1) | 1)?;
    write_signed(w, dy)
}

fn bit(position: u8, set: bool) -> u8 {
    if set {
        1 << position
    } else {
        0
    }
}

// ── Modal state ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Modal {
    layer: Option<u16>,
    datatype: Option<u16>,
    width: Option<u64>,
    height: Option<u64>,
    x: i64,
    y: i64,
    point_list: Option<Vec<(i64, i64)>>,
    placement_cell: Option<String>,
    placement_x: i64,
    placement_y: i64,
}

impl Modal {
    fn reset(&mut self) {
        *self = Modal::default();
    }
}

// ── OASIS Writer ─────────────────────────────────────────────────────

pub struct OasisWriter<W: Write> {
    writer: W,
    modal: Modal,
}

impl<W: Write> OasisWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            modal: Modal::default(),
        }
    }

    /// Write a Library as an OASIS stream. The library name is not part of
    /// the format and is dropped.
    pub fn write(&mut self, lib: &Library) -> Result<(), OasisError> {
        lib.validate_references()?;

        self.writer.write_all(MAGIC)?;
        self.write_start(&lib.units)?;

        for cell in lib.cells() {
            self.write_cell(cell, &lib.units)?;
        }

        self.write_end()?;
        self.writer.flush()?;
        log::info!(
            "Wrote OASIS stream for '{}': {} cells, {} shapes",
            lib.name,
            lib.cell_count(),
            lib.shape_count()
        );
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_start(&mut self, units: &Units) -> Result<(), OasisError> {
        let w = &mut self.writer;
        write_unsigned(w, record_id::START)?;
        write_bytes_string(w, VERSION.as_bytes())?;
        write_real(w, units.dbu_per_micron())?;
        // offset-flag 0: table offsets follow here
        write_unsigned(w, 0)?;
        for _ in 0..6 {
            write_unsigned(w, 0)?; // strict flag
            write_unsigned(w, 0)?; // offset
        }
        Ok(())
    }

    fn write_end(&mut self) -> Result<(), OasisError> {
        // record id (1) + padding b-string + validation scheme (1)
        let padding_len = END_RECORD_LEN - 2 - 2;
        let w = &mut self.writer;
        write_unsigned(w, record_id::END)?;
        write_bytes_string(w, &vec![0u8; padding_len])?;
        write_unsigned(w, 0)?;
        Ok(())
    }

    fn write_cell(&mut self, cell: &Cell, units: &Units) -> Result<(), OasisError> {
        write_unsigned(&mut self.writer, record_id::CELL_NAME)?;
        write_bytes_string(&mut self.writer, cell.name.as_bytes())?;
        self.modal.reset();

        for geom in &cell.geometries {
            match geom {
                GeomPrimitive::Rect(rect) => self.write_rectangle(rect, units)?,
                GeomPrimitive::Polygon(poly) if poly.is_axis_aligned_rect() => {
                    if let Some(bbox) = poly.bbox() {
                        self.write_rectangle(&Rect::from_bbox(poly.layer, &bbox), units)?;
                    }
                }
                GeomPrimitive::Polygon(poly) => self.write_polygon(poly, units)?,
            }
        }

        for inst in &cell.instances {
            self.write_placement(inst, units)?;
        }

        log::debug!(
            "OASIS cell '{}': {} shapes, {} instances",
            cell.name,
            cell.geometry_count(),
            cell.instance_count()
        );
        Ok(())
    }

    fn layer_bits(&mut self, layer: LayerSpec) -> (bool, bool) {
        let write_layer = self.modal.layer != Some(layer.layer);
        let write_datatype = self.modal.datatype != Some(layer.datatype);
        self.modal.layer = Some(layer.layer);
        self.modal.datatype = Some(layer.datatype);
        (write_layer, write_datatype)
    }

    fn write_rectangle(&mut self, rect: &Rect, units: &Units) -> Result<(), OasisError> {
        let x = to_oasis_coord(rect.lower_left.x, units)?;
        let y = to_oasis_coord(rect.lower_left.y, units)?;
        let width = to_oasis_coord(rect.upper_right.x, units)?.abs_diff(x);
        let height = to_oasis_coord(rect.upper_right.y, units)?.abs_diff(y);

        let square = width == height;
        let (write_layer, write_datatype) = self.layer_bits(rect.layer);
        let write_width = self.modal.width != Some(width);
        let write_height = !square && self.modal.height != Some(height);
        let write_x = self.modal.x != x;
        let write_y = self.modal.y != y;

        // S W H X Y R D L
        let info = bit(7, square)
            | bit(6, write_width)
            | bit(5, write_height)
            | bit(4, write_x)
            | bit(3, write_y)
            | bit(1, write_datatype)
            | bit(0, write_layer);

        let w = &mut self.writer;
        write_unsigned(w, record_id::RECTANGLE)?;
        w.write_all(&[info])?;
        if write_layer {
            write_unsigned(w, rect.layer.layer as u64)?;
        }
        if write_datatype {
            write_unsigned(w, rect.layer.datatype as u64)?;
        }
        if write_width {
            write_unsigned(w, width)?;
        }
        if write_height {
            write_unsigned(w, height)?;
        }
        if write_x {
            write_signed(w, x)?;
        }
        if write_y {
            write_signed(w, y)?;
        }

        self.modal.width = Some(width);
        self.modal.height = Some(height);
        self.modal.x = x;
        self.modal.y = y;
        Ok(())
    }

    fn write_polygon(&mut self, poly: &Polygon, units: &Units) -> Result<(), OasisError> {
        let mut points = Vec::with_capacity(poly.vertices.len());
        for p in &poly.vertices {
            points.push((to_oasis_coord(p.x, units)?, to_oasis_coord(p.y, units)?));
        }
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        let Some(&(x, y)) = points.first() else {
            return Ok(());
        };
        let deltas: Vec<(i64, i64)> = points
            .windows(2)
            .map(|pair| (pair[1].0 - pair[0].0, pair[1].1 - pair[0].1))
            .collect();

        let (write_layer, write_datatype) = self.layer_bits(poly.layer);
        let write_points = self.modal.point_list.as_ref() != Some(&deltas);
        let write_x = self.modal.x != x;
        let write_y = self.modal.y != y;

        // 0 0 P X Y R D L
        let info = bit(5, write_points)
            | bit(4, write_x)
            | bit(3, write_y)
            | bit(1, write_datatype)
            | bit(0, write_layer);

        let w = &mut self.writer;
        write_unsigned(w, record_id::POLYGON)?;
        w.write_all(&[info])?;
        if write_layer {
            write_unsigned(w, poly.layer.layer as u64)?;
        }
        if write_datatype {
            write_unsigned(w, poly.layer.datatype as u64)?;
        }
        if write_points {
            write_unsigned(w, POINT_LIST_GDELTA)?;
            write_unsigned(w, deltas.len() as u64)?;
            for &(dx, dy) in &deltas {
                write_g_delta(w, dx, dy)?;
            }
        }
        if write_x {
            write_signed(w, x)?;
        }
        if write_y {
            write_signed(w, y)?;
        }

        self.modal.point_list = Some(deltas);
        self.modal.x = x;
        self.modal.y = y;
        Ok(())
    }

    fn write_placement(&mut self, inst: &CellInstance, units: &Units) -> Result<(), OasisError> {
        let t = &inst.transform;
        let unsupported = |reason: String| OasisError::UnsupportedTransform {
            cell: inst.cell_name.clone(),
            reason,
        };
        if t.scale != 1.0 {
            return Err(unsupported(format!("magnification {}", t.scale)));
        }
        let quarter_turns = t.rotation.rem_euclid(360.0) / 90.0;
        if quarter_turns.fract() != 0.0 {
            return Err(unsupported(format!("rotation {}°", t.rotation)));
        }
        let aa = quarter_turns as u8;

        let x = to_oasis_coord(t.offset.x, units)?;
        let y = to_oasis_coord(t.offset.y, units)?;

        let explicit_cell = self.modal.placement_cell.as_deref() != Some(inst.cell_name.as_str());
        let write_x = self.modal.placement_x != x;
        let write_y = self.modal.placement_y != y;

        // C N X Y R A A F
        let info = bit(7, explicit_cell)
            | bit(5, write_x)
            | bit(4, write_y)
            | (aa << 1)
            | bit(0, t.mirror_x);

        let w = &mut self.writer;
        write_unsigned(w, record_id::PLACEMENT)?;
        w.write_all(&[info])?;
        if explicit_cell {
            write_bytes_string(w, inst.cell_name.as_bytes())?;
        }
        if write_x {
            write_signed(w, x)?;
        }
        if write_y {
            write_signed(w, y)?;
        }

        self.modal.placement_cell = Some(inst.cell_name.clone());
        self.modal.placement_x = x;
        self.modal.placement_y = y;
        Ok(())
    }
}

fn to_oasis_coord(value: f64, units: &Units) -> Result<i64, OasisError> {
    let dbu = units.to_dbu(value);
    // 2^63 is exactly representable; anything at or past it overflows
    if dbu.is_finite() && dbu.abs() < 9.223_372_036_854_775_807e18 {
        Ok(dbu as i64)
    } else {
        Err(OasisError::CoordinateOverflow { value })
    }
}

// ── OASIS Reader ─────────────────────────────────────────────────────

pub struct OasisReader<R: Read> {
    reader: R,
    user_unit: f64,
    modal: Modal,
}

impl<R: Read> OasisReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            user_unit: Units::default().user_unit,
            modal: Modal::default(),
        }
    }

    /// OASIS stores only the database resolution; the user unit is
    /// supplied by the caller (default 1 µm).
    pub fn with_user_unit(mut self, user_unit: f64) -> Self {
        self.user_unit = user_unit;
        self
    }

    pub fn read(&mut self) -> Result<Library, OasisError> {
        let mut magic = [0u8; 13];
        self.reader.read_exact(&mut magic).map_err(|_| OasisError::BadMagic)?;
        if &magic != MAGIC {
            return Err(OasisError::BadMagic);
        }

        let units = self.read_start()?;
        let mut lib = Library::new("library").with_units(units);
        let mut current: Option<Cell> = None;

        loop {
            let id = self.read_unsigned()?;
            match id {
                record_id::PAD => {}
                record_id::END => break,
                record_id::CELL_NAME => {
                    if let Some(cell) = current.take() {
                        lib.add_cell(cell)?;
                    }
                    current = Some(Cell::new(&self.read_string()?));
                    self.modal.reset();
                }
                record_id::XYABSOLUTE => {}
                record_id::RECTANGLE | record_id::POLYGON | record_id::PLACEMENT => {
                    let cell = current.as_mut().ok_or_else(|| {
                        OasisError::Invalid(format!("record {} outside of a cell", id))
                    })?;
                    match id {
                        record_id::RECTANGLE => {
                            let rect = self.read_rectangle(&units)?;
                            cell.add_geometry(rect)?;
                        }
                        record_id::POLYGON => {
                            let poly = self.read_polygon(&units)?;
                            cell.add_geometry(poly)?;
                        }
                        _ => {
                            let inst = self.read_placement(&units)?;
                            cell.add_instance(inst);
                        }
                    }
                }
                other => return Err(OasisError::UnsupportedRecord(other)),
            }
        }

        if let Some(cell) = current.take() {
            lib.add_cell(cell)?;
        }
        lib.validate_references()?;
        log::info!("Read OASIS stream: {} cells, {} shapes", lib.cell_count(), lib.shape_count());
        Ok(lib)
    }

    fn read_byte(&mut self) -> Result<u8, OasisError> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_unsigned(&mut self) -> Result<u64, OasisError> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_byte()?;
            if shift > 63 {
                return Err(OasisError::Invalid("unsigned integer overflow".into()));
            }
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn read_signed(&mut self) -> Result<i64, OasisError> {
        let raw = self.read_unsigned()?;
        let magnitude = (raw >> 1) as i64;
        Ok(if raw & 1 == 1 { -magnitude } else { magnitude })
    }

    fn read_string(&mut self) -> Result<String, OasisError> {
        let len = self.read_unsigned()? as usize;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| OasisError::Invalid(e.to_string()))
    }

    fn read_real(&mut self) -> Result<f64, OasisError> {
        let kind = self.read_unsigned()?;
        let value = match kind {
            0 => self.read_unsigned()? as f64,
            1 => -(self.read_unsigned()? as f64),
            2 => 1.0 / self.read_unsigned()? as f64,
            3 => -1.0 / self.read_unsigned()? as f64,
            4 | 5 => {
                let num = self.read_unsigned()? as f64;
                let den = self.read_unsigned()? as f64;
                if kind == 4 { num / den } else { -num / den }
            }
            6 => {
                let mut buf = [0u8; 4];
                self.reader.read_exact(&mut buf)?;
                f32::from_le_bytes(buf) as f64
            }
            7 => {
                let mut buf = [0u8; 8];
                self.reader.read_exact(&mut buf)?;
                f64::from_le_bytes(buf)
            }
            other => return Err(OasisError::Invalid(format!("real type {}", other))),
        };
        Ok(value)
    }

    fn read_start(&mut self) -> Result<Units, OasisError> {
        if self.read_unsigned()? != record_id::START {
            return Err(OasisError::Invalid("stream does not begin with START".into()));
        }
        let version = self.read_string()?;
        if version != VERSION {
            log::warn!("OASIS version '{}' (expected {})", version, VERSION);
        }
        let resolution = self.read_real()?;
        if self.read_unsigned()? == 0 {
            for _ in 0..12 {
                self.read_unsigned()?;
            }
        }
        Ok(Units::new(self.user_unit, 1e-6 / resolution)?)
    }

    fn layer_fields(&mut self, info: u8) -> Result<LayerSpec, OasisError> {
        if info & 0x01 != 0 {
            self.modal.layer = Some(self.read_u16()?);
        }
        if info & 0x02 != 0 {
            self.modal.datatype = Some(self.read_u16()?);
        }
        Ok(LayerSpec::new(
            self.modal.layer.ok_or(OasisError::ModalUndefined("layer"))?,
            self.modal.datatype.ok_or(OasisError::ModalUndefined("datatype"))?,
        ))
    }

    fn read_u16(&mut self) -> Result<u16, OasisError> {
        let value = self.read_unsigned()?;
        u16::try_from(value).map_err(|_| OasisError::Invalid(format!("layer number {}", value)))
    }

    fn position_fields(&mut self, x_bit: bool, y_bit: bool) -> Result<(i64, i64), OasisError> {
        if x_bit {
            self.modal.x = self.read_signed()?;
        }
        if y_bit {
            self.modal.y = self.read_signed()?;
        }
        Ok((self.modal.x, self.modal.y))
    }

    fn read_rectangle(&mut self, units: &Units) -> Result<Rect, OasisError> {
        let info = self.read_byte()?;
        if info & 0x04 != 0 {
            return Err(OasisError::Invalid("repetitions are not supported".into()));
        }
        let layer = self.layer_fields(info)?;
        let square = info & 0x80 != 0;
        if info & 0x40 != 0 {
            self.modal.width = Some(self.read_unsigned()?);
        }
        let width = self.modal.width.ok_or(OasisError::ModalUndefined("geometry-w"))?;
        if square {
            self.modal.height = Some(width);
        } else if info & 0x20 != 0 {
            self.modal.height = Some(self.read_unsigned()?);
        }
        let height = self.modal.height.ok_or(OasisError::ModalUndefined("geometry-h"))?;
        let (x, y) = self.position_fields(info & 0x10 != 0, info & 0x08 != 0)?;

        Ok(Rect::new(
            layer,
            units.from_dbu(x),
            units.from_dbu(y),
            units.from_dbu(x + width as i64),
            units.from_dbu(y + height as i64),
        ))
    }

    fn read_g_delta(&mut self) -> Result<(i64, i64), OasisError> {
        let raw = self.read_unsigned()?;
        if raw & 1 == 1 {
            let magnitude = (raw >> 2) as i64;
            let dx = if raw & 2 != 0 { -magnitude } else { magnitude };
            return Ok((dx, self.read_signed()?));
        }
        let d = (raw >> 4) as i64;
        let delta = match (raw >> 1) & 0x7 {
            0 => (d, 0),
            1 => (0, d),
            2 => (-d, 0),
            3 => (0, -d),
            4 => (d, d),
            5 => (-d, d),
            6 => (-d, -d),
            _ => (d, -d),
        };
        Ok(delta)
    }

    fn read_point_list(&mut self) -> Result<Vec<(i64, i64)>, OasisError> {
        let kind = self.read_unsigned()?;
        let count = self.read_unsigned()? as usize;
        let mut deltas = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let delta = match kind {
                2 => {
                    let raw = self.read_unsigned()?;
                    let d = (raw >> 2) as i64;
                    match raw & 0x3 {
                        0 => (d, 0),
                        1 => (0, d),
                        2 => (-d, 0),
                        _ => (0, -d),
                    }
                }
                3 => {
                    let raw = self.read_unsigned()?;
                    let d = (raw >> 3) as i64;
                    match raw & 0x7 {
                        0 => (d, 0),
                        1 => (0, d),
                        2 => (-d, 0),
                        3 => (0, -d),
                        4 => (d, d),
                        5 => (-d, d),
                        6 => (-d, -d),
                        _ => (d, -d),
                    }
                }
                POINT_LIST_GDELTA => self.read_g_delta()?,
                other => return Err(OasisError::UnsupportedPointList(other)),
            };
            deltas.push(delta);
        }
        Ok(deltas)
    }

    fn read_polygon(&mut self, units: &Units) -> Result<Polygon, OasisError> {
        let info = self.read_byte()?;
        if info & 0x04 != 0 {
            return Err(OasisError::Invalid("repetitions are not supported".into()));
        }
        let layer = self.layer_fields(info)?;
        if info & 0x20 != 0 {
            self.modal.point_list = Some(self.read_point_list()?);
        }
        let deltas = self
            .modal
            .point_list
            .clone()
            .ok_or(OasisError::ModalUndefined("polygon-point-list"))?;
        let (mut x, mut y) = self.position_fields(info & 0x10 != 0, info & 0x08 != 0)?;

        let mut vertices = Vec::with_capacity(deltas.len() + 1);
        vertices.push(Point::new(units.from_dbu(x), units.from_dbu(y)));
        for (dx, dy) in deltas {
            x += dx;
            y += dy;
            vertices.push(Point::new(units.from_dbu(x), units.from_dbu(y)));
        }
        Ok(Polygon::new(layer, vertices))
    }

    fn read_placement(&mut self, units: &Units) -> Result<CellInstance, OasisError> {
        let info = self.read_byte()?;
        if info & 0x08 != 0 {
            return Err(OasisError::Invalid("repetitions are not supported".into()));
        }
        if info & 0x80 != 0 {
            if info & 0x40 != 0 {
                return Err(OasisError::Invalid("cell reference numbers are not supported".into()));
            }
            self.modal.placement_cell = Some(self.read_string()?);
        }
        let cell_name = self
            .modal
            .placement_cell
            .clone()
            .ok_or(OasisError::ModalUndefined("placement-cell"))?;
        if info & 0x20 != 0 {
            self.modal.placement_x = self.read_signed()?;
        }
        if info & 0x10 != 0 {
            self.modal.placement_y = self.read_signed()?;
        }

        let transform = Transform {
            offset: Point::new(
                units.from_dbu(self.modal.placement_x),
                units.from_dbu(self.modal.placement_y),
            ),
            rotation: f64::from((info >> 1) & 0x3) * 90.0,
            mirror_x: info & 0x01 != 0,
            scale: 1.0,
        };
        Ok(CellInstance::new(&cell_name, transform))
    }
}
