//! Binary page body codec: row-major and column-major, with the version-gated
//! row-count width and `fixed_row_count` terminator.

use crate::dataset::{ArrayInstance, Page};
use crate::error::{IoErrorKind, SdsError, SdsResult};
use crate::layout::{ByteOrder, Layout};
use crate::stream::SdsStream;
use crate::types::{Type, Value};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

const SITE_WRITE: &str = "binary::write_page";
const SITE_READ: &str = "binary::read_page";

fn resolve_order(layout: &Layout) -> ByteOrder {
    layout.byte_order.unwrap_or(ByteOrder::native())
}

fn write_u32(buf: &mut Vec<u8>, order: ByteOrder, v: u32) {
    let mut tmp = [0u8; 4];
    match order {
        ByteOrder::Big => BigEndian::write_u32(&mut tmp, v),
        ByteOrder::Little => LittleEndian::write_u32(&mut tmp, v),
    }
    buf.extend_from_slice(&tmp);
}

fn write_i64(buf: &mut Vec<u8>, order: ByteOrder, v: i64) {
    let mut tmp = [0u8; 8];
    match order {
        ByteOrder::Big => BigEndian::write_i64(&mut tmp, v),
        ByteOrder::Little => LittleEndian::write_i64(&mut tmp, v),
    }
    buf.extend_from_slice(&tmp);
}

fn read_u32(buf: &[u8], order: ByteOrder) -> u32 {
    match order {
        ByteOrder::Big => BigEndian::read_u32(buf),
        ByteOrder::Little => LittleEndian::read_u32(buf),
    }
}

fn read_i64(buf: &[u8], order: ByteOrder) -> i64 {
    match order {
        ByteOrder::Big => BigEndian::read_i64(buf),
        ByteOrder::Little => LittleEndian::read_i64(buf),
    }
}

/// Appends `value`'s on-disk encoding: fixed-width for numeric/char types,
/// Int32 length prefix + raw bytes for `String`.
fn write_value(buf: &mut Vec<u8>, order: ByteOrder, value: &Value) {
    macro_rules! put {
        ($ty:ty, $write:ident, $v:expr) => {{
            let mut tmp = [0u8; std::mem::size_of::<$ty>()];
            match order {
                ByteOrder::Big => BigEndian::$write(&mut tmp, $v),
                ByteOrder::Little => LittleEndian::$write(&mut tmp, $v),
            }
            buf.extend_from_slice(&tmp);
        }};
    }
    match *value {
        Value::LongDouble(v) | Value::Double(v) => put!(f64, write_f64, v),
        Value::Float(v) => put!(f32, write_f32, v),
        Value::Int64(v) => put!(i64, write_i64, v),
        Value::UInt64(v) => put!(u64, write_u64, v),
        Value::Int32(v) => put!(i32, write_i32, v),
        Value::UInt32(v) => put!(u32, write_u32, v),
        Value::Int16(v) => put!(i16, write_i16, v),
        Value::UInt16(v) => put!(u16, write_u16, v),
        Value::Char(v) => buf.push(v),
        Value::String(ref s) => {
            write_u32(buf, order, s.len() as u32);
            buf.extend_from_slice(s.as_bytes());
        }
    }
}

fn read_exact_buf(stream: &mut dyn SdsStream, buf: &mut [u8], site: &'static str) -> SdsResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(SdsError::io(site, IoErrorKind::ShortRead));
        }
        filled += n;
    }
    Ok(())
}

/// Reads one value of `ty`, consuming exactly its on-disk width (`String`'s
/// length prefix is read first to determine the rest).
fn read_value(stream: &mut dyn SdsStream, order: ByteOrder, ty: Type, site: &'static str) -> SdsResult<Value> {
    Ok(match ty {
        Type::LongDouble => {
            let mut tmp = [0u8; 8];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::LongDouble(match order {
                ByteOrder::Big => BigEndian::read_f64(&tmp),
                ByteOrder::Little => LittleEndian::read_f64(&tmp),
            })
        }
        Type::Double => {
            let mut tmp = [0u8; 8];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::Double(match order {
                ByteOrder::Big => BigEndian::read_f64(&tmp),
                ByteOrder::Little => LittleEndian::read_f64(&tmp),
            })
        }
        Type::Float => {
            let mut tmp = [0u8; 4];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::Float(match order {
                ByteOrder::Big => BigEndian::read_f32(&tmp),
                ByteOrder::Little => LittleEndian::read_f32(&tmp),
            })
        }
        Type::Int64 => {
            let mut tmp = [0u8; 8];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::Int64(read_i64(&tmp, order))
        }
        Type::UInt64 => {
            let mut tmp = [0u8; 8];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::UInt64(match order {
                ByteOrder::Big => BigEndian::read_u64(&tmp),
                ByteOrder::Little => LittleEndian::read_u64(&tmp),
            })
        }
        Type::Int32 => {
            let mut tmp = [0u8; 4];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::Int32(match order {
                ByteOrder::Big => BigEndian::read_i32(&tmp),
                ByteOrder::Little => LittleEndian::read_i32(&tmp),
            })
        }
        Type::UInt32 => {
            let mut tmp = [0u8; 4];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::UInt32(read_u32(&tmp, order))
        }
        Type::Int16 => {
            let mut tmp = [0u8; 2];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::Int16(match order {
                ByteOrder::Big => BigEndian::read_i16(&tmp),
                ByteOrder::Little => LittleEndian::read_i16(&tmp),
            })
        }
        Type::UInt16 => {
            let mut tmp = [0u8; 2];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::UInt16(match order {
                ByteOrder::Big => BigEndian::read_u16(&tmp),
                ByteOrder::Little => LittleEndian::read_u16(&tmp),
            })
        }
        Type::Char => {
            let mut tmp = [0u8; 1];
            read_exact_buf(stream, &mut tmp, site)?;
            Value::Char(tmp[0])
        }
        Type::String => {
            let mut len_buf = [0u8; 4];
            read_exact_buf(stream, &mut len_buf, site)?;
            let len = read_u32(&len_buf, order) as usize;
            let mut data = vec![0u8; len];
            read_exact_buf(stream, &mut data, site)?;
            Value::String(String::from_utf8_lossy(&data).to_string())
        }
    })
}

fn parse_fixed_value(ty: Type, text: &str) -> Value {
    match ty {
        Type::LongDouble => Value::LongDouble(text.parse().unwrap_or(0.0)),
        Type::Double => Value::Double(text.parse().unwrap_or(0.0)),
        Type::Float => Value::Float(text.parse().unwrap_or(0.0)),
        Type::Int32 => Value::Int32(text.parse().unwrap_or(0)),
        Type::UInt32 => Value::UInt32(text.parse().unwrap_or(0)),
        Type::Int64 => Value::Int64(text.parse().unwrap_or(0)),
        Type::UInt64 => Value::UInt64(text.parse().unwrap_or(0)),
        Type::Int16 => Value::Int16(text.parse().unwrap_or(0)),
        Type::UInt16 => Value::UInt16(text.parse().unwrap_or(0)),
        Type::String => Value::String(text.to_string()),
        Type::Char => Value::Char(text.bytes().next().unwrap_or(0)),
    }
}

/// Writes one page's binary body: row count, parameters, arrays, then rows
/// (row-major) or columns (column-major, version >= 3).
pub fn write_page_binary(stream: &mut dyn SdsStream, layout: &Layout, page: &Page) -> SdsResult<()> {
    let order = resolve_order(layout);
    let mut buf = Vec::new();

    if !layout.data_mode.no_row_counts {
        if layout.version() < 5 {
            write_u32(&mut buf, order, page.n_rows as u32);
        } else {
            write_i64(&mut buf, order, page.n_rows as i64);
        }
    }

    for (idx, def) in layout.parameters.iter().enumerate() {
        if def.fixed_value.is_some() {
            continue;
        }
        write_value(&mut buf, order, &page.parameters[idx]);
    }

    for (idx, def) in layout.arrays.iter().enumerate() {
        let array = &page.arrays[idx];
        for d in 0..def.dimensions {
            write_u32(&mut buf, order, *array.dimension.get(d).unwrap_or(&0) as u32);
        }
        for v in &array.data {
            write_value(&mut buf, order, v);
        }
    }

    if layout.data_mode.column_major {
        for col_idx in 0..layout.n_columns() {
            for row in 0..page.n_rows {
                write_value(&mut buf, order, &page.columns[col_idx][row]);
            }
        }
    } else {
        for row in 0..page.n_rows {
            for col_idx in 0..layout.n_columns() {
                write_value(&mut buf, order, &page.columns[col_idx][row]);
            }
        }
    }

    stream.write(&buf)?;
    let _ = SITE_WRITE;

    if layout.data_mode.fixed_row_count {
        // Trailing zero terminator lets a non-seeking reader detect the end
        // of a fixed-row-count page without relying on EOF.
        let mut term = Vec::new();
        if layout.version() < 5 {
            write_u32(&mut term, order, 0);
        } else {
            write_i64(&mut term, order, 0);
        }
        stream.write(&term)?;
    }

    Ok(())
}

/// Reads one page from its binary body, given the already-parsed layout
///. Returns `None` at clean end-of-stream (no row count could
/// be read at all, meaning there are no more pages).
pub fn read_page_binary(stream: &mut dyn SdsStream, layout: &Layout) -> SdsResult<Option<Page>> {
    let order = resolve_order(layout);
    let count_width = if layout.version() < 5 { 4 } else { 8 };

    let n_rows = if layout.data_mode.no_row_counts {
        None
    } else {
        let mut tmp = vec![0u8; count_width];
        let n = stream.read(&mut tmp)?;
        if n == 0 {
            return Ok(None);
        }
        if n != count_width {
            return Err(SdsError::io(SITE_READ, IoErrorKind::ShortRead));
        }
        Some(if count_width == 4 {
            read_u32(&tmp, order) as usize
        } else {
            read_i64(&tmp, order) as usize
        })
    };

    let mut page = Page::allocate(layout, n_rows.unwrap_or(0));

    for (idx, def) in layout.parameters.iter().enumerate() {
        if let Some(fixed) = &def.fixed_value {
            page.parameters[idx] = parse_fixed_value(def.ty, fixed);
            continue;
        }
        page.parameters[idx] = read_value(stream, order, def.ty, SITE_READ)?;
    }

    for (idx, def) in layout.arrays.iter().enumerate() {
        let mut dims = Vec::with_capacity(def.dimensions);
        for _ in 0..def.dimensions {
            let mut tmp = [0u8; 4];
            read_exact_buf(stream, &mut tmp, SITE_READ)?;
            dims.push(read_u32(&tmp, order) as usize);
        }
        let elements: usize = dims.iter().product();
        let mut data = Vec::with_capacity(elements);
        for _ in 0..elements {
            data.push(read_value(stream, order, def.ty, SITE_READ)?);
        }
        page.arrays[idx] = ArrayInstance {
            definition: idx,
            dimension: dims,
            data,
        };
    }

    let n_rows = n_rows.unwrap_or(0);
    if layout.data_mode.column_major {
        for col_idx in 0..layout.n_columns() {
            let ty = layout.columns[col_idx].ty;
            for row in 0..n_rows {
                page.columns[col_idx][row] = read_value(stream, order, ty, SITE_READ)?;
            }
        }
    } else {
        for row in 0..n_rows {
            for col_idx in 0..layout.n_columns() {
                let ty = layout.columns[col_idx].ty;
                page.columns[col_idx][row] = read_value(stream, order, ty, SITE_READ)?;
            }
        }
    }
    page.n_rows = n_rows;

    if layout.data_mode.fixed_row_count {
        let mut term = vec![0u8; count_width];
        read_exact_buf(stream, &mut term, SITE_READ)?;
    }

    Ok(Some(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, StreamRole};
    use crate::layout::{ColumnDef, CommonDef, DataModeKind, ParameterDef};
    use crate::setters::Target;
    use crate::stream::mem::MemStream;

    fn build_layout() -> Layout {
        let mut layout = Layout::new();
        layout
            .define_parameter(ParameterDef {
                common: CommonDef {
                    name: "p".into(),
                    ..Default::default()
                },
                ty: Type::Double,
                field_length: 0,
                fixed_value: None,
            })
            .unwrap();
        layout
            .define_column(ColumnDef {
                common: CommonDef {
                    name: "x".into(),
                    ..Default::default()
                },
                ty: Type::Int32,
                field_length: 0,
            })
            .unwrap();
        layout.data_mode.mode = DataModeKind::Binary;
        layout.byte_order = Some(ByteOrder::Little);
        layout
    }

    #[test]
    fn binary_row_major_round_trip() {
        let layout = build_layout();
        let mut ds = Dataset::new(layout.clone(), Box::new(MemStream::new()), StreamRole::Write);
        ds.start_page(3).unwrap();
        ds.set_parameter(Target::Name("p"), Value::Double(3.5)).unwrap();
        ds.set_column(Target::Name("x"), &[Value::Int32(1), Value::Int32(2), Value::Int32(3)])
            .unwrap();

        let buf = {
            let page = ds.page.as_ref().unwrap();
            let mut stream = MemStream::new();
            write_page_binary(&mut stream, &ds.layout, page).unwrap();
            stream.into_bytes()
        };

        let mut read_stream = MemStream::from_bytes(buf);
        let page = read_page_binary(&mut read_stream, &layout).unwrap().unwrap();
        assert_eq!(page.parameters[0], Value::Double(3.5));
        assert_eq!(page.columns[0][..3], [Value::Int32(1), Value::Int32(2), Value::Int32(3)]);
        assert_eq!(page.n_rows, 3);
    }

    #[test]
    fn binary_column_major_round_trip() {
        let mut layout = build_layout();
        layout.data_mode.column_major = true;
        let mut ds = Dataset::new(layout.clone(), Box::new(MemStream::new()), StreamRole::Write);
        ds.start_page(2).unwrap();
        ds.set_column(Target::Name("x"), &[Value::Int32(10), Value::Int32(20)]).unwrap();

        let buf = {
            let page = ds.page.as_ref().unwrap();
            let mut stream = MemStream::new();
            write_page_binary(&mut stream, &ds.layout, page).unwrap();
            stream.into_bytes()
        };

        let mut read_stream = MemStream::from_bytes(buf);
        let page = read_page_binary(&mut read_stream, &layout).unwrap().unwrap();
        assert_eq!(page.columns[0][..2], [Value::Int32(10), Value::Int32(20)]);
    }

    #[test]
    fn fixed_row_count_terminator_round_trips() {
        let mut layout = build_layout();
        layout.data_mode.fixed_row_count = true;
        let mut ds = Dataset::new(layout.clone(), Box::new(MemStream::new()), StreamRole::Write);
        ds.start_page(1).unwrap();
        ds.set_column(Target::Name("x"), &[Value::Int32(7)]).unwrap();

        let buf = {
            let page = ds.page.as_ref().unwrap();
            let mut stream = MemStream::new();
            write_page_binary(&mut stream, &ds.layout, page).unwrap();
            stream.into_bytes()
        };

        let mut read_stream = MemStream::from_bytes(buf);
        let page = read_page_binary(&mut read_stream, &layout).unwrap().unwrap();
        assert_eq!(page.columns[0][0], Value::Int32(7));
        assert!(read_stream.eof());
    }
}
