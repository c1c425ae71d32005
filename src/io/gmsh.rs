//! Gmsh `.msh` writer and reader.
//!
//! # Supported format
//! - Version **2.2**, ASCII (`2.2 0 8`) and binary (`2.2 1 8`) on write.
//! - ASCII only on read; the reader exists to inspect exported artifacts.
//! - Element types: 1 (line), 3 (quad), 5 (hex), 15 (point).
//! - Every element carries two tags: physical group, then elementary entity.
//!
//! # Limitations
//! - `.msh` v4.x (block-based) is not supported.
//! - Higher-order elements are not supported.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};

use crate::mesh_error::MesherError;

/// Gmsh element type codes used by the writer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    Point,
    Line,
    Quad,
    Hex,
}

impl ElementKind {
    pub fn code(self) -> u32 {
        match self {
            ElementKind::Line => 1,
            ElementKind::Quad => 3,
            ElementKind::Hex => 5,
            ElementKind::Point => 15,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ElementKind::Line),
            3 => Some(ElementKind::Quad),
            5 => Some(ElementKind::Hex),
            15 => Some(ElementKind::Point),
            _ => None,
        }
    }

    pub fn node_count(self) -> usize {
        match self {
            ElementKind::Point => 1,
            ElementKind::Line => 2,
            ElementKind::Quad => 4,
            ElementKind::Hex => 8,
        }
    }

    pub fn dimension(self) -> u8 {
        match self {
            ElementKind::Point => 0,
            ElementKind::Line => 1,
            ElementKind::Quad => 2,
            ElementKind::Hex => 3,
        }
    }
}

/// One element record. Node ids are 1-based.
#[derive(Clone, Debug, PartialEq)]
pub struct MshElement {
    pub kind: ElementKind,
    pub physical: i32,
    pub elementary: i32,
    pub nodes: Vec<usize>,
}

/// In-memory image of a `.msh` v2.2 file. Node `i` has id `i + 1`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MshDocument {
    pub nodes: Vec<[f64; 3]>,
    pub elements: Vec<MshElement>,
    /// `(dimension, physical tag) -> name`.
    pub physical_names: BTreeMap<(u8, i32), String>,
}

impl MshDocument {
    pub fn count_of(&self, kind: ElementKind) -> usize {
        self.elements.iter().filter(|e| e.kind == kind).count()
    }

    pub fn physical_tag(&self, dim: u8, name: &str) -> Option<i32> {
        self.physical_names
            .iter()
            .find(|((d, _), n)| *d == dim && n.as_str() == name)
            .map(|((_, tag), _)| *tag)
    }
}

fn io_err(e: std::io::Error) -> MesherError {
    MesherError::export(e.to_string())
}

/// Gmsh `.msh` v2.2 writer.
#[derive(Debug, Default, Clone)]
pub struct GmshWriter {
    pub binary: bool,
}

impl GmshWriter {
    pub fn new(binary: bool) -> Self {
        GmshWriter { binary }
    }

    pub fn write<W: Write>(&self, mut w: W, doc: &MshDocument) -> Result<(), MesherError> {
        let file_type = if self.binary { 1 } else { 0 };
        writeln!(w, "$MeshFormat").map_err(io_err)?;
        writeln!(w, "2.2 {file_type} 8").map_err(io_err)?;
        if self.binary {
            w.write_all(&1i32.to_le_bytes()).map_err(io_err)?;
            writeln!(w).map_err(io_err)?;
        }
        writeln!(w, "$EndMeshFormat").map_err(io_err)?;

        if !doc.physical_names.is_empty() {
            writeln!(w, "$PhysicalNames").map_err(io_err)?;
            writeln!(w, "{}", doc.physical_names.len()).map_err(io_err)?;
            for ((dim, tag), name) in &doc.physical_names {
                writeln!(w, "{dim} {tag} \"{name}\"").map_err(io_err)?;
            }
            writeln!(w, "$EndPhysicalNames").map_err(io_err)?;
        }

        writeln!(w, "$Nodes").map_err(io_err)?;
        writeln!(w, "{}", doc.nodes.len()).map_err(io_err)?;
        if self.binary {
            let mut buf = BytesMut::with_capacity(doc.nodes.len() * 28);
            for (i, xyz) in doc.nodes.iter().enumerate() {
                buf.put_i32_le((i + 1) as i32);
                for &c in xyz {
                    buf.put_f64_le(c);
                }
            }
            w.write_all(&buf).map_err(io_err)?;
            writeln!(w).map_err(io_err)?;
        } else {
            for (i, [x, y, z]) in doc.nodes.iter().enumerate() {
                writeln!(w, "{} {x} {y} {z}", i + 1).map_err(io_err)?;
            }
        }
        writeln!(w, "$EndNodes").map_err(io_err)?;

        writeln!(w, "$Elements").map_err(io_err)?;
        writeln!(w, "{}", doc.elements.len()).map_err(io_err)?;
        if self.binary {
            self.write_binary_elements(&mut w, doc)?;
            writeln!(w).map_err(io_err)?;
        } else {
            for (i, e) in doc.elements.iter().enumerate() {
                write!(
                    w,
                    "{} {} 2 {} {}",
                    i + 1,
                    e.kind.code(),
                    e.physical,
                    e.elementary
                )
                .map_err(io_err)?;
                for n in &e.nodes {
                    write!(w, " {n}").map_err(io_err)?;
                }
                writeln!(w).map_err(io_err)?;
            }
        }
        writeln!(w, "$EndElements").map_err(io_err)?;
        w.flush().map_err(io_err)
    }

    /// Binary elements are grouped in blocks of consecutive same-type
    /// records, each prefixed by `(type, count, num_tags)`.
    fn write_binary_elements<W: Write>(&self, w: &mut W, doc: &MshDocument) -> Result<(), MesherError> {
        let mut buf = BytesMut::new();
        let mut start = 0;
        while start < doc.elements.len() {
            let kind = doc.elements[start].kind;
            let end = doc.elements[start..]
                .iter()
                .position(|e| e.kind != kind)
                .map_or(doc.elements.len(), |off| start + off);
            buf.put_i32_le(kind.code() as i32);
            buf.put_i32_le((end - start) as i32);
            buf.put_i32_le(2);
            for (i, e) in doc.elements[start..end].iter().enumerate() {
                buf.put_i32_le((start + i + 1) as i32);
                buf.put_i32_le(e.physical);
                buf.put_i32_le(e.elementary);
                for &n in &e.nodes {
                    buf.put_i32_le(n as i32);
                }
            }
            start = end;
        }
        w.write_all(&buf).map_err(io_err)
    }
}

fn parse_err(message: impl Into<String>) -> MesherError {
    MesherError::import(message)
}

/// Gmsh `.msh` reader for ASCII v2.2 files.
#[derive(Debug, Default, Clone)]
pub struct GmshReader;

impl GmshReader {
    fn parse_version(line: &str) -> Result<&str, MesherError> {
        let mut parts = line.split_whitespace();
        let version = parts
            .next()
            .ok_or_else(|| parse_err("missing mesh format version"))?;
        let file_type = parts
            .next()
            .ok_or_else(|| parse_err("missing mesh format type"))?;
        if file_type != "0" {
            return Err(parse_err("binary .msh files are not supported"));
        }
        Ok(version)
    }

    fn parse_num<T: std::str::FromStr>(raw: Option<&str>, what: &str) -> Result<T, MesherError> {
        let raw = raw.ok_or_else(|| parse_err(format!("missing {what}")))?;
        raw.parse::<T>()
            .map_err(|_| parse_err(format!("invalid {what}: {raw}")))
    }

    fn expect_end<'a>(
        lines: &mut impl Iterator<Item = &'a str>,
        marker: &str,
    ) -> Result<(), MesherError> {
        let end = lines
            .next()
            .ok_or_else(|| parse_err(format!("missing {marker}")))?;
        if end.trim() != marker {
            return Err(parse_err(format!("missing {marker}")));
        }
        Ok(())
    }

    pub fn read<R: Read>(&self, mut reader: R) -> Result<MshDocument, MesherError> {
        let mut contents = String::new();
        reader
            .read_to_string(&mut contents)
            .map_err(|e| parse_err(e.to_string()))?;
        let mut lines = contents.lines();

        let mut version: Option<String> = None;
        let mut doc = MshDocument::default();

        while let Some(line) = lines.next() {
            match line.trim() {
                "$MeshFormat" => {
                    let format_line = lines.next().ok_or_else(|| parse_err("missing MeshFormat"))?;
                    version = Some(Self::parse_version(format_line)?.to_string());
                    Self::expect_end(&mut lines, "$EndMeshFormat")?;
                }
                "$PhysicalNames" => {
                    let count: usize = Self::parse_num(lines.next(), "physical name count")?;
                    for _ in 0..count {
                        let entry = lines
                            .next()
                            .ok_or_else(|| parse_err("unexpected end of physical names"))?;
                        let mut parts = entry.splitn(3, char::is_whitespace);
                        let dim: u8 = Self::parse_num(parts.next(), "physical dimension")?;
                        let tag: i32 = Self::parse_num(parts.next(), "physical tag")?;
                        let name = parts
                            .next()
                            .ok_or_else(|| parse_err("missing physical name"))?
                            .trim()
                            .trim_matches('"')
                            .to_string();
                        doc.physical_names.insert((dim, tag), name);
                    }
                    Self::expect_end(&mut lines, "$EndPhysicalNames")?;
                }
                "$Nodes" => {
                    let count: usize = Self::parse_num(lines.next(), "node count")?;
                    for expected_id in 1..=count {
                        let node_line = lines
                            .next()
                            .ok_or_else(|| parse_err("unexpected end of node list"))?;
                        let mut parts = node_line.split_whitespace();
                        let id: usize = Self::parse_num(parts.next(), "node id")?;
                        if id != expected_id {
                            return Err(parse_err(format!(
                                "non-contiguous node id {id}, expected {expected_id}"
                            )));
                        }
                        let x = Self::parse_num(parts.next(), "x coordinate")?;
                        let y = Self::parse_num(parts.next(), "y coordinate")?;
                        let z = Self::parse_num(parts.next(), "z coordinate")?;
                        doc.nodes.push([x, y, z]);
                    }
                    Self::expect_end(&mut lines, "$EndNodes")?;
                }
                "$Elements" => {
                    let count: usize = Self::parse_num(lines.next(), "element count")?;
                    for _ in 0..count {
                        let elem_line = lines
                            .next()
                            .ok_or_else(|| parse_err("unexpected end of element list"))?;
                        let mut parts = elem_line.split_whitespace();
                        let _id: usize = Self::parse_num(parts.next(), "element id")?;
                        let code: u32 = Self::parse_num(parts.next(), "element type")?;
                        let kind = ElementKind::from_code(code)
                            .ok_or_else(|| parse_err(format!("unsupported element type: {code}")))?;
                        let num_tags: usize = Self::parse_num(parts.next(), "element tag count")?;
                        let mut tags = Vec::with_capacity(num_tags);
                        for _ in 0..num_tags {
                            tags.push(Self::parse_num::<i32>(parts.next(), "element tag")?);
                        }
                        let mut nodes = Vec::with_capacity(kind.node_count());
                        for _ in 0..kind.node_count() {
                            nodes.push(Self::parse_num(parts.next(), "element node id")?);
                        }
                        doc.elements.push(MshElement {
                            kind,
                            physical: tags.first().copied().unwrap_or(0),
                            elementary: tags.get(1).copied().unwrap_or(0),
                            nodes,
                        });
                    }
                    Self::expect_end(&mut lines, "$EndElements")?;
                }
                _ => {
                    // ignore other sections
                }
            }
        }

        let version = version.unwrap_or_else(|| "2.2".to_string());
        if version != "2.2" {
            return Err(parse_err(format!("unsupported gmsh version: {version}")));
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MshDocument {
        let mut doc = MshDocument::default();
        doc.nodes = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
        doc.elements.push(MshElement {
            kind: ElementKind::Quad,
            physical: 1,
            elementary: 7,
            nodes: vec![1, 2, 3, 4],
        });
        doc.elements.push(MshElement {
            kind: ElementKind::Line,
            physical: 0,
            elementary: 3,
            nodes: vec![1, 2],
        });
        doc.physical_names.insert((2, 1), "intake_walls".into());
        doc
    }

    #[test]
    fn ascii_output_reads_back() {
        let doc = sample();
        let mut out = Vec::new();
        GmshWriter::new(false).write(&mut out, &doc).unwrap();
        let back = GmshReader.read(out.as_slice()).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.physical_tag(2, "intake_walls"), Some(1));
    }

    #[test]
    fn binary_header_and_reader_refusal() {
        let mut out = Vec::new();
        GmshWriter::new(true).write(&mut out, &sample()).unwrap();
        assert!(out.starts_with(b"$MeshFormat\n2.2 1 8\n"));
        assert_eq!(&out[20..24], &1i32.to_le_bytes());
        assert!(matches!(
            GmshReader.read(out.as_slice()),
            Err(MesherError::Import(_))
        ));
    }

    #[test]
    fn binary_elements_are_blocked_by_type() {
        let mut doc = sample();
        doc.elements.push(doc.elements[0].clone());
        let mut body = Vec::new();
        GmshWriter::new(true)
            .write_binary_elements(&mut body, &doc)
            .unwrap();
        // quad block (1 elem), line block (1 elem), quad block (1 elem)
        let header = |off: usize| -> [i32; 3] {
            let r = |o: usize| i32::from_le_bytes(body[o..o + 4].try_into().unwrap());
            [r(off), r(off + 4), r(off + 8)]
        };
        assert_eq!(header(0), [3, 1, 2]);
        let quad_record = 4 * (1 + 2 + 4);
        assert_eq!(header(12 + quad_record), [1, 1, 2]);
    }
}
