//! ASCII page body codec: whitespace-separated tokens, `lines_per_row` lines
//! per logical row, same quoting rules as the header.

use crate::codec::{quote_string, unquote_string};
use crate::dataset::{ArrayInstance, Page};
use crate::error::{SdsError, SdsResult};
use crate::layout::Layout;
use crate::stream::SdsStream;
use crate::types::{Type, Value};

const SITE_WRITE: &str = "ascii::write_page";
const SITE_READ: &str = "ascii::read_page";

/// Splits one line into tokens on whitespace, treating a double-quoted span
/// (with backslash-escaped embedded quotes) as a single token.
fn split_tokens(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        let start = i;
        if chars[i] == '"' {
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                if chars[i] == '"' {
                    i += 1;
                    break;
                }
                i += 1;
            }
        } else {
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
        }
        tokens.push(chars[start..i].iter().collect::<String>());
    }
    tokens
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => quote_string(s),
        Value::Char(c) => quote_string(&(*c as char).to_string()),
        other => other.format_as_string(),
    }
}

fn parse_value(token: &str, ty: Type, site: &'static str) -> SdsResult<Value> {
    let unquoted = unquote_string(token);
    Ok(match ty {
        Type::String => Value::String(unquoted),
        Type::Char => Value::Char(unquoted.bytes().next().unwrap_or(0)),
        Type::LongDouble => Value::LongDouble(
            unquoted
                .parse()
                .map_err(|_| SdsError::bad_field(site, format!("invalid longdouble '{unquoted}'")))?,
        ),
        Type::Double => Value::Double(
            unquoted
                .parse()
                .map_err(|_| SdsError::bad_field(site, format!("invalid double '{unquoted}'")))?,
        ),
        Type::Float => Value::Float(
            unquoted
                .parse()
                .map_err(|_| SdsError::bad_field(site, format!("invalid float '{unquoted}'")))?,
        ),
        Type::Int64 => Value::Int64(
            unquoted
                .parse()
                .map_err(|_| SdsError::bad_field(site, format!("invalid long64 '{unquoted}'")))?,
        ),
        Type::UInt64 => Value::UInt64(
            unquoted
                .parse()
                .map_err(|_| SdsError::bad_field(site, format!("invalid ulong64 '{unquoted}'")))?,
        ),
        Type::Int32 => Value::Int32(
            unquoted
                .parse()
                .map_err(|_| SdsError::bad_field(site, format!("invalid long '{unquoted}'")))?,
        ),
        Type::UInt32 => Value::UInt32(
            unquoted
                .parse()
                .map_err(|_| SdsError::bad_field(site, format!("invalid ulong '{unquoted}'")))?,
        ),
        Type::Int16 => Value::Int16(
            unquoted
                .parse()
                .map_err(|_| SdsError::bad_field(site, format!("invalid short '{unquoted}'")))?,
        ),
        Type::UInt16 => Value::UInt16(
            unquoted
                .parse()
                .map_err(|_| SdsError::bad_field(site, format!("invalid ushort '{unquoted}'")))?,
        ),
    })
}

fn read_line(stream: &mut dyn SdsStream, site: &'static str) -> SdsResult<String> {
    let mut line = String::new();
    let n = stream.gets(&mut line)?;
    if n == 0 {
        return Err(SdsError::io(site, crate::error::IoErrorKind::ShortRead));
    }
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Writes one page's ASCII body: optional row count, parameters, arrays,
/// then `n_rows` rows of `lines_per_row` lines each.
pub fn write_page_ascii(stream: &mut dyn SdsStream, layout: &Layout, page: &Page) -> SdsResult<()> {
    let _ = SITE_WRITE;
    if !layout.data_mode.no_row_counts {
        stream.puts(&format!("{}\n", page.n_rows))?;
    }

    for (idx, def) in layout.parameters.iter().enumerate() {
        if def.fixed_value.is_some() {
            continue;
        }
        stream.puts(&format!("{}\n", format_value(&page.parameters[idx])))?;
    }

    for (idx, def) in layout.arrays.iter().enumerate() {
        let array = &page.arrays[idx];
        let dims: Vec<String> = (0..def.dimensions)
            .map(|d| array.dimension.get(d).copied().unwrap_or(0).to_string())
            .collect();
        stream.puts(&format!("{}\n", dims.join(" ")))?;
        if !array.data.is_empty() {
            let values: Vec<String> = array.data.iter().map(format_value).collect();
            stream.puts(&format!("{}\n", values.join(" ")))?;
        }
    }

    let lines_per_row = layout.data_mode.lines_per_row.max(1) as usize;
    let n_columns = layout.n_columns();
    let columns_per_line = n_columns.div_ceil(lines_per_row).max(1);
    for row in 0..page.n_rows {
        for chunk_start in (0..n_columns).step_by(columns_per_line) {
            let chunk_end = (chunk_start + columns_per_line).min(n_columns);
            let values: Vec<String> = (chunk_start..chunk_end)
                .map(|col| format_value(&page.columns[col][row]))
                .collect();
            stream.puts(&format!("{}\n", values.join(" ")))?;
        }
    }

    Ok(())
}

/// Reads one page from its ASCII body. Returns `None` at a
/// clean end-of-stream before any row-count line could be read.
pub fn read_page_ascii(stream: &mut dyn SdsStream, layout: &Layout) -> SdsResult<Option<Page>> {
    let n_rows = if layout.data_mode.no_row_counts {
        None
    } else {
        let mut line = String::new();
        if stream.gets(&mut line)? == 0 {
            return Ok(None);
        }
        Some(
            line.trim()
                .parse::<usize>()
                .map_err(|_| SdsError::bad_field(SITE_READ, format!("invalid row count '{}'", line.trim())))?,
        )
    };

    let mut page = Page::allocate(layout, n_rows.unwrap_or(0));

    for (idx, def) in layout.parameters.iter().enumerate() {
        if let Some(fixed) = &def.fixed_value {
            page.parameters[idx] = parse_value(fixed, def.ty, SITE_READ)?;
            continue;
        }
        let line = read_line(stream, SITE_READ)?;
        page.parameters[idx] = parse_value(line.trim(), def.ty, SITE_READ)?;
    }

    for (idx, def) in layout.arrays.iter().enumerate() {
        let dims_line = read_line(stream, SITE_READ)?;
        let dims: Vec<usize> = split_tokens(&dims_line)
            .iter()
            .map(|t| t.parse().unwrap_or(0))
            .collect();
        if dims.len() != def.dimensions {
            return Err(SdsError::bad_field(
                SITE_READ,
                format!("expected {} dimensions, got {}", def.dimensions, dims.len()),
            ));
        }
        let elements: usize = dims.iter().product();
        let mut data = Vec::with_capacity(elements);
        if elements > 0 {
            let values_line = read_line(stream, SITE_READ)?;
            let tokens = split_tokens(&values_line);
            if tokens.len() != elements {
                return Err(SdsError::bad_field(
                    SITE_READ,
                    format!("expected {elements} array elements, got {}", tokens.len()),
                ));
            }
            for t in tokens {
                data.push(parse_value(&t, def.ty, SITE_READ)?);
            }
        }
        page.arrays[idx] = ArrayInstance {
            definition: idx,
            dimension: dims,
            data,
        };
    }

    let lines_per_row = layout.data_mode.lines_per_row.max(1) as usize;
    let n_columns = layout.n_columns();
    let columns_per_line = n_columns.div_ceil(lines_per_row).max(1);
    let n_rows = n_rows.unwrap_or(0);
    for row in 0..n_rows {
        for chunk_start in (0..n_columns).step_by(columns_per_line) {
            let chunk_end = (chunk_start + columns_per_line).min(n_columns);
            let line = read_line(stream, SITE_READ)?;
            let tokens = split_tokens(&line);
            if tokens.len() != chunk_end - chunk_start {
                return Err(SdsError::bad_field(
                    SITE_READ,
                    format!("expected {} columns on row {row}, got {}", chunk_end - chunk_start, tokens.len()),
                ));
            }
            for (col, token) in (chunk_start..chunk_end).zip(tokens.iter()) {
                page.columns[col][row] = parse_value(token, layout.columns[col].ty, SITE_READ)?;
            }
        }
        page.row_flag[row] = true;
    }
    page.n_rows = n_rows;

    Ok(Some(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, StreamRole};
    use crate::layout::{ColumnDef, CommonDef, ParameterDef};
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
        layout
            .define_column(ColumnDef {
                common: CommonDef {
                    name: "name".into(),
                    ..Default::default()
                },
                ty: Type::String,
                field_length: 0,
            })
            .unwrap();
        layout
    }

    #[test]
    fn ascii_round_trip_preserves_parameters_and_columns() {
        let layout = build_layout();
        let mut ds = Dataset::new(layout.clone(), Box::new(MemStream::new()), StreamRole::Write);
        ds.start_page(2).unwrap();
        ds.set_parameter(Target::Name("p"), Value::Double(3.5)).unwrap();
        ds.set_column(Target::Name("x"), &[Value::Int32(1), Value::Int32(2)]).unwrap();
        ds.set_column(
            Target::Name("name"),
            &[Value::String("hello, world".into()), Value::String("plain".into())],
        )
        .unwrap();

        let buf = {
            let page = ds.page.as_ref().unwrap();
            let mut stream = MemStream::new();
            write_page_ascii(&mut stream, &ds.layout, page).unwrap();
            stream.into_bytes()
        };

        let mut read_stream = MemStream::from_bytes(buf);
        let page = read_page_ascii(&mut read_stream, &layout).unwrap().unwrap();
        assert_eq!(page.parameters[0], Value::Double(3.5));
        assert_eq!(page.columns[0][..2], [Value::Int32(1), Value::Int32(2)]);
        assert_eq!(
            page.columns[1][..2],
            [Value::String("hello, world".into()), Value::String("plain".into())]
        );
        assert_eq!(page.n_rows, 2);
    }

    #[test]
    fn quoting_round_trips_through_tokens() {
        let token = quote_string("a value, with comma");
        let tokens = split_tokens(&token);
        assert_eq!(tokens.len(), 1);
        assert_eq!(unquote_string(&tokens[0]), "a value, with comma");
    }
}
