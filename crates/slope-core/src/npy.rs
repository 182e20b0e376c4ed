//! Slope grids on disk as NumPy `.npy` arrays.
//!
//! Writes format version 1.0, dtype `<f8`, C order, shape `(height, width)`.
//! Values are stored bit-for-bit, so `NaN` and every finite value survive a
//! round trip. Reading also accepts version 2.0 headers and `<f4` data.
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::error::{Result, SlopeError};
use crate::grid::Grid;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
/// Header (magic + version + length + dict) is padded to a multiple of this.
const HEADER_ALIGN: usize = 64;

fn npy_err(msg: impl Into<String>) -> SlopeError {
    SlopeError::Npy(msg.into())
}

pub fn write<W: Write>(mut w: W, grid: &Grid) -> Result<()> {
    let dict = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({}, {}), }}",
        grid.height, grid.width
    );
    // magic(6) + version(2) + header_len(2) + dict + padding + '\n'
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    let header_len = dict.len() + padding + 1;

    w.write_all(MAGIC)?;
    w.write_all(&[1, 0])?;
    w.write_u16::<LE>(header_len as u16)?;
    w.write_all(dict.as_bytes())?;
    w.write_all(&vec![b' '; padding])?;
    w.write_all(b"\n")?;
    for &v in &grid.data {
        w.write_f64::<LE>(v)?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Debug, PartialEq)]
struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Value of `key` in the header dict, up to the next top-level comma or `}`.
fn dict_value<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    let pat = format!("'{key}':");
    let start = dict.find(&pat)? + pat.len();
    let rest = dict[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')')? + 1
    } else {
        rest.find([',', '}'])?
    };
    Some(rest[..end].trim())
}

fn parse_header(dict: &str) -> Result<Header> {
    let descr = dict_value(dict, "descr")
        .ok_or_else(|| npy_err("header has no descr"))?
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string();
    let fortran_order = match dict_value(dict, "fortran_order") {
        Some("False") => false,
        Some("True") => true,
        _ => return Err(npy_err("header has no fortran_order")),
    };
    let shape = dict_value(dict, "shape")
        .ok_or_else(|| npy_err("header has no shape"))?
        .trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| npy_err(format!("bad shape entry {s:?}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Header {
        descr,
        fortran_order,
        shape,
    })
}

pub fn read<R: Read>(mut r: R) -> Result<Grid> {
    let mut magic = [0u8; 6];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(npy_err("not an npy file"));
    }
    let major = r.read_u8()?;
    let _minor = r.read_u8()?;
    let header_len = match major {
        1 => r.read_u16::<LE>()? as usize,
        2 | 3 => r.read_u32::<LE>()? as usize,
        v => return Err(npy_err(format!("unsupported npy version {v}"))),
    };
    let mut dict = Vec::new();
    (&mut r).take(header_len as u64).read_to_end(&mut dict)?;
    if dict.len() != header_len {
        return Err(npy_err("truncated header"));
    }
    let dict = String::from_utf8(dict).map_err(|_| npy_err("header is not utf-8"))?;
    let header = parse_header(&dict)?;

    if header.fortran_order {
        return Err(npy_err("fortran-ordered arrays are not supported"));
    }
    let [height, width] = header.shape[..] else {
        return Err(npy_err(format!("expected a 2-D array, got shape {:?}", header.shape)));
    };

    let elem = match header.descr.as_str() {
        "<f8" => 8,
        "<f4" => 4,
        other => return Err(npy_err(format!("unsupported dtype {other}"))),
    };
    let n_bytes = height
        .checked_mul(width)
        .and_then(|n| n.checked_mul(elem))
        .ok_or_else(|| npy_err(format!("shape ({height}, {width}) is too large")))?;

    // Bounded by the bytes actually present, not by what the header claims.
    let mut payload = Vec::new();
    r.take(n_bytes as u64).read_to_end(&mut payload)?;
    if payload.len() != n_bytes {
        return Err(npy_err(format!(
            "payload has {} bytes, shape ({height}, {width}) needs {n_bytes}",
            payload.len()
        )));
    }

    let mut bytes = payload.as_slice();
    let data = if elem == 8 {
        let mut data = vec![0f64; n_bytes / 8];
        bytes.read_f64_into::<LE>(&mut data)?;
        data
    } else {
        let mut data = vec![0f32; n_bytes / 4];
        bytes.read_f32_into::<LE>(&mut data)?;
        data.into_iter().map(f64::from).collect()
    };
    Grid::from_vec(height, width, data)
}

pub fn save<P: AsRef<Path>>(path: P, grid: &Grid) -> Result<()> {
    let path = path.as_ref();
    debug!("writing {}x{} grid to {path:?}", grid.height, grid.width);
    write(BufWriter::new(File::create(path)?), grid)
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Grid> {
    let path = path.as_ref();
    debug!("loading {path:?}");
    read(BufReader::new(File::open(path)?))
}
