//! In-memory reference kernel for axis-aligned primitive scenes.
//!
//! `InMemoryEngine` implements the whole [`GeometryEngine`] surface for
//! models made of axis-aligned boxes, closed box shells and planar sheets.
//! It is deterministic: tags start at 1 per dimension and only grow, and
//! every query returns entities in ascending `(dim, tag)` order.
//!
//! Supported semantics:
//! - `fragment` accepts volume objects and tools nested inside them. Solid
//!   tools are retained and carved out of the object, closed shells enclose
//!   a new volume, sheets are embedded. The object keeps its tag.
//! - `boundary` ignores `oriented`: tags are always reported positive.
//! - `heal` is the identity on the well-formed models this kernel builds.
//! - `generate` builds a structured lattice at `Mesh.MeshSizeMax`.
//!
//! A [`FaultPlan`] injects failures at each capability so the pipeline's
//! fallback paths can be driven deterministically.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::engine::scene::{Scene, ShapeSpec};
use crate::engine::{
    BoundaryQuery, FieldHandle, FieldKind, FragmentOutput, GeometryEngine, HealFlags,
    OptionValue,
};
use crate::geometry::BoundingBox;
use crate::io::gmsh::{ElementKind, GmshWriter, MshDocument, MshElement};
use crate::mesh_error::MesherError;
use crate::pipeline::mesh_driver::MeshStage;
use crate::topology::{DimTag, EntitySet};

/// Upper bound on lattice cells per entity; spacing doubles until it fits.
const MAX_CELLS_PER_ENTITY: usize = 200_000;
/// Default lattice spacing when `Mesh.MeshSizeMax` is unset.
const DEFAULT_SPACING: f64 = 1.0;

/// Failures to inject into an [`InMemoryEngine`].
#[derive(Clone, Debug, Default)]
pub struct FaultPlan {
    pub import_fails: bool,
    pub fragment_fails: bool,
    /// Fragmentation succeeds but reports no per-input map.
    pub drop_fragment_map: bool,
    /// Fragmentation succeeds but leaves no volume in the model.
    pub drop_volumes_after_fragment: bool,
    pub heal_fails: bool,
    /// Dimensions whose `generate` call always fails.
    pub generate_fails: Vec<u8>,
    /// 2D generation fails while `Mesh.Algorithm` is one of these.
    pub surface_fails_with_algorithms: Vec<i32>,
    pub export_fails: bool,
    /// Export fails for paths whose file stem ends in `_debug`.
    pub debug_export_fails: bool,
    /// Options that accept their first value and reject any later change.
    pub locked_options: Vec<String>,
}

/// Stored state of a registered field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRecord {
    pub kind: FieldKind,
    pub numbers: BTreeMap<String, f64>,
    pub lists: BTreeMap<String, Vec<f64>>,
    pub strings: BTreeMap<String, String>,
}

impl FieldRecord {
    fn new(kind: FieldKind) -> Self {
        FieldRecord {
            kind,
            numbers: BTreeMap::new(),
            lists: BTreeMap::new(),
            strings: BTreeMap::new(),
        }
    }

    pub fn number(&self, property: &str) -> Option<f64> {
        self.numbers.get(property).copied()
    }

    pub fn list(&self, property: &str) -> Option<&[f64]> {
        self.lists.get(property).map(Vec::as_slice)
    }

    pub fn string(&self, property: &str) -> Option<&str> {
        self.strings.get(property).map(String::as_str)
    }
}

/// A named physical group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalGroup {
    pub dim: u8,
    pub tag: i32,
    pub name: String,
    pub entities: Vec<i32>,
}

/// One recorded `generate` call.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationCall {
    pub dim: u8,
    pub algorithm_2d: Option<f64>,
    pub algorithm_3d: Option<f64>,
    pub succeeded: bool,
}

#[derive(Clone, Debug)]
struct Entity {
    bbox: BoundingBox,
    /// Downward adjacency: entities of dimension `dim - 1`.
    boundary: Vec<DimTag>,
}

#[derive(Clone, Debug, Default)]
struct MeshState {
    nodes: Vec<[f64; 3]>,
    node_index: HashMap<[i64; 3], usize>,
    elements: Vec<(DimTag, ElementKind, Vec<usize>)>,
    generated_dim: u8,
    quantum: f64,
}

impl MeshState {
    fn node(&mut self, p: [f64; 3]) -> usize {
        let q = self.quantum;
        let key = [
            (p[0] / q).round() as i64,
            (p[1] / q).round() as i64,
            (p[2] / q).round() as i64,
        ];
        if let Some(&i) = self.node_index.get(&key) {
            return i;
        }
        self.nodes.push(p);
        let i = self.nodes.len();
        self.node_index.insert(key, i);
        i
    }
}

/// Deterministic kernel over axis-aligned primitives.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEngine {
    entities: BTreeMap<DimTag, Entity>,
    next_tag: [i32; 4],
    /// Closed shells that do not bound a volume yet.
    open_shells: Vec<Vec<DimTag>>,
    /// Volume tag -> sheets embedded in it.
    embedded: BTreeMap<i32, Vec<DimTag>>,
    options: BTreeMap<String, OptionValue>,
    fields: BTreeMap<FieldHandle, FieldRecord>,
    next_field: i32,
    background_field: Option<FieldHandle>,
    boundary_layer_field: Option<FieldHandle>,
    physical_groups: Vec<PhysicalGroup>,
    mesh: MeshState,
    generation_log: Vec<GenerationCall>,
    exported: Vec<PathBuf>,
    faults: FaultPlan,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        InMemoryEngine {
            faults,
            ..Self::default()
        }
    }

    pub fn faults_mut(&mut self) -> &mut FaultPlan {
        &mut self.faults
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    pub fn field(&self, handle: FieldHandle) -> Option<&FieldRecord> {
        self.fields.get(&handle)
    }

    pub fn background_field(&self) -> Option<FieldHandle> {
        self.background_field
    }

    pub fn boundary_layer_field(&self) -> Option<FieldHandle> {
        self.boundary_layer_field
    }

    pub fn physical_groups(&self) -> &[PhysicalGroup] {
        &self.physical_groups
    }

    pub fn generation_log(&self) -> &[GenerationCall] {
        &self.generation_log
    }

    pub fn exported_paths(&self) -> &[PathBuf] {
        &self.exported
    }

    /// Sheets embedded in volume `tag` by fragmentation.
    pub fn embedded_in(&self, tag: i32) -> &[DimTag] {
        self.embedded.get(&tag).map_or(&[], Vec::as_slice)
    }

    pub fn element_count(&self, kind: ElementKind) -> usize {
        self.mesh.elements.iter().filter(|(_, k, _)| *k == kind).count()
    }

    // -------------------------------------------------------------------------
    // Model construction
    // -------------------------------------------------------------------------

    fn fresh_tag(&mut self, dim: u8) -> i32 {
        let slot = &mut self.next_tag[dim as usize];
        *slot += 1;
        *slot
    }

    fn insert(&mut self, dim: u8, bbox: BoundingBox, boundary: Vec<DimTag>) -> DimTag {
        let id = DimTag::new(dim, self.fresh_tag(dim));
        self.entities.insert(id, Entity { bbox, boundary });
        id
    }

    fn insert_point(&mut self, p: [f64; 3]) -> DimTag {
        self.insert(0, BoundingBox::new(p, p), Vec::new())
    }

    fn insert_curve(&mut self, a: DimTag, b: DimTag) -> DimTag {
        let mut bbox = self.entities[&a].bbox;
        bbox.include(&self.entities[&b].bbox);
        self.insert(1, bbox, vec![a, b])
    }

    fn surface_bbox(&self, curves: &[DimTag]) -> BoundingBox {
        BoundingBox::fold(curves.iter().map(|c| &self.entities[c].bbox))
    }

    /// Six faces of `b` sharing 8 points and 12 curves.
    fn insert_box_faces(&mut self, b: &BoundingBox) -> Vec<DimTag> {
        let corner = |c: usize| {
            [
                if c & 1 == 0 { b.min[0] } else { b.max[0] },
                if c & 2 == 0 { b.min[1] } else { b.max[1] },
                if c & 4 == 0 { b.min[2] } else { b.max[2] },
            ]
        };
        let points: Vec<DimTag> = (0..8).map(|c| self.insert_point(corner(c))).collect();

        // Edge along `axis` starting from corner `c` (bit `axis` clear).
        let mut edges: Vec<(usize, usize, DimTag)> = Vec::with_capacity(12);
        for axis in 0..3 {
            for c in 0..8usize {
                if c & (1 << axis) == 0 {
                    let d = c | (1 << axis);
                    let curve = self.insert_curve(points[c], points[d]);
                    edges.push((c, d, curve));
                }
            }
        }

        let mut faces = Vec::with_capacity(6);
        for axis in 0..3 {
            for side in 0..2usize {
                let on_face = |c: usize| ((c >> axis) & 1) == side;
                let curves: Vec<DimTag> = edges
                    .iter()
                    .filter(|(c, d, _)| on_face(*c) && on_face(*d))
                    .map(|(_, _, e)| *e)
                    .collect();
                let bbox = self.surface_bbox(&curves);
                faces.push(self.insert(2, bbox, curves));
            }
        }
        faces
    }

    fn insert_sheet(&mut self, b: &BoundingBox) -> DimTag {
        let e = b.extents();
        let flat = (0..3).find(|&i| e[i] == 0.0).unwrap_or(2);
        let (u, v) = match flat {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        let at = |su: bool, sv: bool| {
            let mut p = b.min;
            p[u] = if su { b.max[u] } else { b.min[u] };
            p[v] = if sv { b.max[v] } else { b.min[v] };
            p
        };
        let p = [
            self.insert_point(at(false, false)),
            self.insert_point(at(true, false)),
            self.insert_point(at(true, true)),
            self.insert_point(at(false, true)),
        ];
        let curves: Vec<DimTag> = (0..4)
            .map(|i| self.insert_curve(p[i], p[(i + 1) % 4]))
            .collect();
        self.insert(2, *b, curves)
    }

    /// Adds every primitive of `scene` to the model.
    pub fn load_scene(&mut self, scene: &Scene) {
        for shape in &scene.shapes {
            let b = shape.bbox();
            match shape {
                ShapeSpec::Solid { .. } => {
                    let faces = self.insert_box_faces(&b);
                    self.insert(3, b, faces);
                }
                ShapeSpec::Shell { .. } => {
                    let faces = self.insert_box_faces(&b);
                    self.open_shells.push(faces);
                }
                ShapeSpec::Sheet { .. } => {
                    self.insert_sheet(&b);
                }
            }
        }
    }

    fn require(&self, e: DimTag) -> Result<&Entity, MesherError> {
        self.entities
            .get(&e)
            .ok_or_else(|| MesherError::engine(format!("unknown entity {e}")))
    }

    fn remove_volumes(&mut self) {
        self.entities.retain(|k, _| k.dim != 3);
        self.embedded.clear();
    }

    // -------------------------------------------------------------------------
    // Lattice mesher
    // -------------------------------------------------------------------------

    fn spacing(&self) -> f64 {
        self.options
            .get("Mesh.MeshSizeMax")
            .and_then(OptionValue::as_number)
            .filter(|h| *h > 0.0 && h.is_finite())
            .unwrap_or(DEFAULT_SPACING)
    }

    fn divisions(extents: [f64; 3], mut h: f64) -> [usize; 3] {
        // Counted in f64 so tiny spacings cannot overflow.
        loop {
            let n = extents.map(|e| if e > 0.0 { (e / h).ceil().max(1.0) } else { 0.0 });
            let cells: f64 = n.iter().filter(|&&k| k > 0.0).product();
            if cells <= MAX_CELLS_PER_ENTITY as f64 {
                return n.map(|k| k as usize);
            }
            h *= 2.0;
        }
    }

    fn lerp(b: &BoundingBox, axis: usize, i: usize, n: usize) -> f64 {
        if n == 0 {
            return b.min[axis];
        }
        b.min[axis] + (b.max[axis] - b.min[axis]) * (i as f64) / (n as f64)
    }

    fn mesh_curves(&mut self, h: f64) {
        let curves: Vec<(DimTag, BoundingBox)> = self
            .entities
            .iter()
            .filter(|(k, _)| k.dim == 1)
            .map(|(k, e)| (*k, e.bbox))
            .collect();
        for (tag, b) in curves {
            let n = Self::divisions(b.extents(), h);
            let axis = (0..3).find(|&i| n[i] > 0).unwrap_or(0);
            let steps = n[axis].max(1);
            let at = |i: usize| {
                let mut p = b.min;
                p[axis] = Self::lerp(&b, axis, i, steps);
                p
            };
            for i in 0..steps {
                let a = self.mesh.node(at(i));
                let c = self.mesh.node(at(i + 1));
                self.mesh.elements.push((tag, ElementKind::Line, vec![a, c]));
            }
        }
    }

    fn mesh_surfaces(&mut self, h: f64) {
        let surfaces: Vec<(DimTag, BoundingBox)> = self
            .entities
            .iter()
            .filter(|(k, _)| k.dim == 2)
            .map(|(k, e)| (*k, e.bbox))
            .collect();
        for (tag, b) in surfaces {
            let n = Self::divisions(b.extents(), h);
            let axes: Vec<usize> = (0..3).filter(|&i| n[i] > 0).collect();
            let [u, v] = match axes.as_slice() {
                [u, v] => [*u, *v],
                _ => continue,
            };
            let at = |i: usize, j: usize| {
                let mut p = b.min;
                p[u] = Self::lerp(&b, u, i, n[u]);
                p[v] = Self::lerp(&b, v, j, n[v]);
                p
            };
            for j in 0..n[v] {
                for i in 0..n[u] {
                    let quad = vec![
                        self.mesh.node(at(i, j)),
                        self.mesh.node(at(i + 1, j)),
                        self.mesh.node(at(i + 1, j + 1)),
                        self.mesh.node(at(i, j + 1)),
                    ];
                    self.mesh.elements.push((tag, ElementKind::Quad, quad));
                }
            }
        }
    }

    fn mesh_volumes(&mut self, h: f64) {
        let volumes: Vec<(DimTag, BoundingBox)> = self
            .entities
            .iter()
            .filter(|(k, _)| k.dim == 3)
            .map(|(k, e)| (*k, e.bbox))
            .collect();
        for (tag, b) in &volumes {
            let holes: Vec<BoundingBox> = volumes
                .iter()
                .filter(|(other, ob)| other != tag && b.strictly_contains(ob))
                .map(|(_, ob)| *ob)
                .collect();
            let n = Self::divisions(b.extents(), h);
            let at = |i: usize, j: usize, k: usize| {
                [
                    Self::lerp(b, 0, i, n[0]),
                    Self::lerp(b, 1, j, n[1]),
                    Self::lerp(b, 2, k, n[2]),
                ]
            };
            for k in 0..n[2] {
                for j in 0..n[1] {
                    for i in 0..n[0] {
                        let lo = at(i, j, k);
                        let hi = at(i + 1, j + 1, k + 1);
                        let center = [
                            0.5 * (lo[0] + hi[0]),
                            0.5 * (lo[1] + hi[1]),
                            0.5 * (lo[2] + hi[2]),
                        ];
                        if holes.iter().any(|hb| hb.contains_point(center)) {
                            continue;
                        }
                        let hex = [
                            (i, j, k),
                            (i + 1, j, k),
                            (i + 1, j + 1, k),
                            (i, j + 1, k),
                            (i, j, k + 1),
                            (i + 1, j, k + 1),
                            (i + 1, j + 1, k + 1),
                            (i, j + 1, k + 1),
                        ]
                        .iter()
                        .map(|&(a, c, d)| self.mesh.node(at(a, c, d)))
                        .collect();
                        self.mesh.elements.push((*tag, ElementKind::Hex, hex));
                    }
                }
            }
        }
    }

    fn to_document(&self) -> MshDocument {
        let mut doc = MshDocument {
            nodes: self.mesh.nodes.clone(),
            ..MshDocument::default()
        };
        for g in &self.physical_groups {
            doc.physical_names.insert((g.dim, g.tag), g.name.clone());
        }
        for (entity, kind, nodes) in &self.mesh.elements {
            let physical = self
                .physical_groups
                .iter()
                .find(|g| g.dim == entity.dim && g.entities.contains(&entity.tag))
                .map_or(0, |g| g.tag);
            doc.elements.push(MshElement {
                kind: *kind,
                physical,
                elementary: entity.tag,
                nodes: nodes.clone(),
            });
        }
        doc
    }
}

fn stage_of(dim: u8) -> MeshStage {
    match dim {
        1 => MeshStage::Curve,
        2 => MeshStage::Surface,
        _ => MeshStage::Volume,
    }
}

impl GeometryEngine for InMemoryEngine {
    fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), MesherError> {
        if let OptionValue::Number(n) = value {
            if !n.is_finite() {
                return Err(MesherError::engine(format!("option {name}: non-finite value")));
            }
        }
        if self.faults.locked_options.iter().any(|o| o == name)
            && self.options.get(name).is_some_and(|old| *old != value)
        {
            return Err(MesherError::engine(format!("option {name} cannot be changed")));
        }
        self.options.insert(name.to_string(), value);
        Ok(())
    }

    fn import(&mut self, path: &Path) -> Result<(), MesherError> {
        if self.faults.import_fails {
            return Err(MesherError::import(format!(
                "{}: kernel rejected the file",
                path.display()
            )));
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if ext != "json" {
            return Err(MesherError::import(format!(
                "{}: unsupported exchange format '.{ext}' (this kernel reads JSON scenes)",
                path.display()
            )));
        }
        let scene = Scene::from_path(path)?;
        self.load_scene(&scene);
        Ok(())
    }

    fn entities(&self, dim: Option<u8>) -> EntitySet {
        self.entities
            .keys()
            .copied()
            .filter(|k| dim.is_none_or(|d| k.dim == d))
            .collect()
    }

    fn bounding_box(&self, entity: Option<DimTag>) -> Result<BoundingBox, MesherError> {
        match entity {
            Some(e) => Ok(self.require(e)?.bbox),
            None => Ok(BoundingBox::fold(self.entities.values().map(|e| &e.bbox))),
        }
    }

    fn add_box(&mut self, bbox: &BoundingBox) -> Result<DimTag, MesherError> {
        if bbox.is_empty() || bbox.extents().iter().any(|&x| x <= 0.0 || !x.is_finite()) {
            return Err(MesherError::geometry(format!(
                "box needs a positive finite extent on every axis, got {:?}",
                bbox.extents()
            )));
        }
        let faces = self.insert_box_faces(bbox);
        Ok(self.insert(3, *bbox, faces))
    }

    fn add_volume_from_surfaces(&mut self, surfaces: &EntitySet) -> Result<DimTag, MesherError> {
        let surfaces = surfaces.of_dim(2).deduplicated();
        if surfaces.is_empty() {
            return Err(MesherError::geometry("surface loop needs at least one surface"));
        }
        let mut uses: BTreeMap<DimTag, usize> = BTreeMap::new();
        for &s in surfaces.iter() {
            for &c in &self.require(s)?.boundary {
                *uses.entry(c).or_default() += 1;
            }
        }
        if let Some((open, _)) = uses.iter().find(|(_, n)| **n != 2) {
            return Err(MesherError::geometry(format!(
                "surface loop is not closed: curve {open} is not shared by exactly two surfaces"
            )));
        }
        let bbox = BoundingBox::fold(surfaces.iter().map(|s| &self.entities[s].bbox));
        self.open_shells
            .retain(|shell| !shell.iter().all(|f| surfaces.contains(*f)));
        Ok(self.insert(3, bbox, surfaces.as_slice().to_vec()))
    }

    fn fragment(
        &mut self,
        objects: &EntitySet,
        tools: &EntitySet,
    ) -> Result<FragmentOutput, MesherError> {
        if self.faults.fragment_fails {
            return Err(MesherError::geometry("boolean fragmentation failed"));
        }
        for &e in objects.iter().chain(tools.iter()) {
            self.require(e)?;
        }
        if let Some(bad) = objects.iter().find(|o| o.dim != 3) {
            return Err(MesherError::geometry(format!(
                "object {bad} is not a volume; only volume objects are supported"
            )));
        }

        let mut output = FragmentOutput::default();
        let mut tool_pieces: BTreeMap<DimTag, Vec<DimTag>> = BTreeMap::new();
        for &t in tools.iter() {
            tool_pieces.insert(t, vec![t]);
        }

        for &object in objects.iter() {
            let outer = self.entities[&object].bbox;
            let mut pieces = vec![object];
            let mut inner: Vec<DimTag> = Vec::new();

            for &t in tools.iter() {
                let tb = self.entities[&t].bbox;
                if !outer.strictly_contains(&tb) && !outer.contains(&tb, 0.0) {
                    return Err(MesherError::geometry(format!(
                        "tool {t} is not contained in object {object}"
                    )));
                }
                if t.dim == 3 {
                    inner.push(t);
                }
            }

            // Closed shells passed as tools enclose a new volume.
            let shells = std::mem::take(&mut self.open_shells);
            for shell in shells {
                if shell.iter().all(|f| tools.contains(*f)) {
                    let bbox = BoundingBox::fold(shell.iter().map(|f| &self.entities[f].bbox));
                    let vol = self.insert(3, bbox, shell.clone());
                    for f in &shell {
                        if let Some(p) = tool_pieces.get_mut(f) {
                            p.push(vol);
                        }
                    }
                    inner.push(vol);
                } else {
                    self.open_shells.push(shell);
                }
            }

            // Only outermost nested volumes carve holes.
            let boxes: Vec<(DimTag, BoundingBox)> =
                inner.iter().map(|v| (*v, self.entities[v].bbox)).collect();
            let holes: Vec<DimTag> = boxes
                .iter()
                .filter(|(v, b)| !boxes.iter().any(|(w, wb)| w != v && wb.strictly_contains(b)))
                .map(|(v, _)| *v)
                .collect();

            let mut boundary = self.entities[&object].boundary.clone();
            for h in &holes {
                boundary.extend(self.entities[h].boundary.iter().copied());
            }

            let faces_of_volumes: Vec<DimTag> = self
                .entities
                .iter()
                .filter(|(k, _)| k.dim == 3)
                .flat_map(|(_, e)| e.boundary.iter().copied())
                .collect();
            let sheets: Vec<DimTag> = tools
                .iter()
                .copied()
                .filter(|t| t.dim == 2 && !faces_of_volumes.contains(t))
                .collect();

            if let Some(entity) = self.entities.get_mut(&object) {
                entity.boundary = boundary;
            }
            if !sheets.is_empty() {
                self.embedded.entry(object.tag).or_default().extend(sheets.iter().copied());
            }

            pieces.extend(inner.iter().copied());
            output.entities.push(object);
            output.entities.extend(inner.iter().copied());
            output.entities.extend(sheets.iter().copied());
            output.per_input.push(pieces.into_iter().collect());
        }

        for t in tools.iter() {
            output
                .per_input
                .push(tool_pieces.remove(t).unwrap_or_default().into_iter().collect());
        }
        output.entities = output.entities.canonical();

        if self.faults.drop_volumes_after_fragment {
            self.remove_volumes();
            output.entities = output.entities.iter().copied().filter(|e| e.dim < 3).collect();
            for entry in &mut output.per_input {
                *entry = entry.iter().copied().filter(|e| e.dim < 3).collect();
            }
        }
        if self.faults.drop_fragment_map {
            output.per_input.clear();
        }
        Ok(output)
    }

    fn boundary(
        &self,
        entities: &EntitySet,
        query: BoundaryQuery,
    ) -> Result<EntitySet, MesherError> {
        let mut level: Vec<DimTag> = Vec::new();
        for &e in entities.iter() {
            level.extend(self.require(e)?.boundary.iter().copied());
        }
        if query.combined {
            let mut count: HashMap<DimTag, usize> = HashMap::new();
            for e in &level {
                *count.entry(*e).or_default() += 1;
            }
            level.retain(|e| count[e] % 2 == 1);
            level = EntitySet::from(level).deduplicated().into_iter().collect();
        }
        let mut result = EntitySet::from(level.clone());
        if query.recursive {
            let mut frontier = EntitySet::from(level).deduplicated();
            while !frontier.is_empty() {
                let mut next = EntitySet::new();
                for &e in frontier.iter() {
                    next.extend(self.require(e)?.boundary.iter().copied());
                }
                let next = next.deduplicated().difference(&result);
                result.merge(&next);
                frontier = next;
            }
        }
        Ok(result)
    }

    fn heal(
        &mut self,
        entities: &EntitySet,
        tolerance: f64,
        _flags: HealFlags,
    ) -> Result<EntitySet, MesherError> {
        if self.faults.heal_fails {
            return Err(MesherError::geometry("shape healing failed"));
        }
        if !(tolerance > 0.0) {
            return Err(MesherError::geometry(format!(
                "healing tolerance must be positive, got {tolerance}"
            )));
        }
        for &e in entities.iter() {
            self.require(e)
                .map_err(|_| MesherError::geometry(format!("cannot heal unknown entity {e}")))?;
        }
        Ok(entities.clone())
    }

    fn add_physical_group(
        &mut self,
        dim: u8,
        tags: &[i32],
        name: &str,
    ) -> Result<i32, MesherError> {
        for &t in tags {
            self.require(DimTag::new(dim, t))?;
        }
        let tag = self.physical_groups.iter().filter(|g| g.dim == dim).count() as i32 + 1;
        self.physical_groups.push(PhysicalGroup {
            dim,
            tag,
            name: name.to_string(),
            entities: tags.to_vec(),
        });
        Ok(tag)
    }

    fn add_field(&mut self, kind: FieldKind) -> Result<FieldHandle, MesherError> {
        self.next_field += 1;
        let handle = FieldHandle(self.next_field);
        self.fields.insert(handle, FieldRecord::new(kind));
        Ok(handle)
    }

    fn set_field_number(
        &mut self,
        field: FieldHandle,
        property: &str,
        value: f64,
    ) -> Result<(), MesherError> {
        let record = self
            .fields
            .get_mut(&field)
            .ok_or_else(|| MesherError::engine(format!("unknown field {field}")))?;
        record.numbers.insert(property.to_string(), value);
        Ok(())
    }

    fn set_field_numbers(
        &mut self,
        field: FieldHandle,
        property: &str,
        values: &[f64],
    ) -> Result<(), MesherError> {
        let record = self
            .fields
            .get_mut(&field)
            .ok_or_else(|| MesherError::engine(format!("unknown field {field}")))?;
        record.lists.insert(property.to_string(), values.to_vec());
        Ok(())
    }

    fn set_field_string(
        &mut self,
        field: FieldHandle,
        property: &str,
        value: &str,
    ) -> Result<(), MesherError> {
        let record = self
            .fields
            .get_mut(&field)
            .ok_or_else(|| MesherError::engine(format!("unknown field {field}")))?;
        record.strings.insert(property.to_string(), value.to_string());
        Ok(())
    }

    fn set_background_field(&mut self, field: FieldHandle) -> Result<(), MesherError> {
        if !self.fields.contains_key(&field) {
            return Err(MesherError::engine(format!("unknown field {field}")));
        }
        self.background_field = Some(field);
        Ok(())
    }

    fn set_boundary_layer_field(&mut self, field: FieldHandle) -> Result<(), MesherError> {
        match self.fields.get(&field) {
            Some(r) if r.kind == FieldKind::BoundaryLayer => {
                self.boundary_layer_field = Some(field);
                Ok(())
            }
            Some(r) => Err(MesherError::engine(format!(
                "field {field} is a {} field, not a boundary layer",
                r.kind.as_str()
            ))),
            None => Err(MesherError::engine(format!("unknown field {field}"))),
        }
    }

    fn generate(&mut self, dim: u8) -> Result<(), MesherError> {
        if !(1..=3).contains(&dim) {
            return Err(MesherError::engine(format!("cannot generate dimension {dim}")));
        }
        let algorithm_2d = self.options.get("Mesh.Algorithm").and_then(OptionValue::as_number);
        let algorithm_3d = self.options.get("Mesh.Algorithm3D").and_then(OptionValue::as_number);
        let surface_algorithm_rejected = dim == 2
            && algorithm_2d.is_some_and(|a| {
                self.faults
                    .surface_fails_with_algorithms
                    .iter()
                    .any(|&bad| bad as f64 == a)
            });
        let failed = self.faults.generate_fails.contains(&dim) || surface_algorithm_rejected;
        self.generation_log.push(GenerationCall {
            dim,
            algorithm_2d,
            algorithm_3d,
            succeeded: !failed,
        });
        if failed {
            return Err(MesherError::MeshGeneration {
                stage: stage_of(dim),
                message: format!(
                    "kernel could not mesh dimension {dim} with algorithm {:?}",
                    if dim == 3 { algorithm_3d } else { algorithm_2d }
                ),
            });
        }

        let h = self.spacing();
        if self.mesh.quantum == 0.0 {
            let scale = BoundingBox::fold(self.entities.values().map(|e| &e.bbox)).max_extent();
            self.mesh.quantum = (scale.max(1.0)) * 1e-9;
        }
        for d in (self.mesh.generated_dim + 1)..=dim {
            match d {
                1 => self.mesh_curves(h),
                2 => self.mesh_surfaces(h),
                _ => self.mesh_volumes(h),
            }
            self.mesh.generated_dim = d;
        }
        Ok(())
    }

    fn export_mesh(
        &mut self,
        path: &Path,
        binary: bool,
        version: f64,
    ) -> Result<(), MesherError> {
        let is_debug = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.ends_with("_debug"));
        if self.faults.export_fails || (is_debug && self.faults.debug_export_fails) {
            return Err(MesherError::export(format!(
                "{}: kernel refused to write",
                path.display()
            )));
        }
        if (version - 2.2).abs() > 1e-9 {
            return Err(MesherError::export(format!(
                "unsupported .msh format version {version}; only 2.2 is written"
            )));
        }
        let file = File::create(path)
            .map_err(|e| MesherError::export(format!("{}: {e}", path.display())))?;
        GmshWriter::new(binary).write(BufWriter::new(file), &self.to_document())?;
        self.exported.push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Scene {
        Scene {
            shapes: vec![ShapeSpec::Solid {
                min: [0.0; 3],
                max: [1.0; 3],
            }],
        }
    }

    #[test]
    fn box_topology_is_shared() {
        let mut eng = InMemoryEngine::new();
        eng.load_scene(&cube());
        assert_eq!(eng.entities(Some(0)).len(), 8);
        assert_eq!(eng.entities(Some(1)).len(), 12);
        assert_eq!(eng.entities(Some(2)).len(), 6);
        assert_eq!(eng.entities(Some(3)).len(), 1);
        let faces = eng
            .boundary(&EntitySet::from(vec![DimTag::volume(1)]), BoundaryQuery::per_entity())
            .unwrap();
        assert_eq!(faces.len(), 6);
        // A closed box has no combined boundary curves.
        let combined = eng.boundary(&faces, BoundaryQuery::combined()).unwrap();
        assert!(combined.is_empty());
        let per_face = eng.boundary(&faces, BoundaryQuery::per_entity()).unwrap();
        assert_eq!(per_face.len(), 24);
        assert_eq!(per_face.deduplicated().len(), 12);
    }

    #[test]
    fn recursive_boundary_reaches_points() {
        let mut eng = InMemoryEngine::new();
        eng.load_scene(&Scene {
            shapes: vec![ShapeSpec::Sheet {
                min: [0.0, 0.0, 0.0],
                max: [2.0, 1.0, 0.0],
            }],
        });
        let sheet = eng.entities(Some(2));
        let all = eng
            .boundary(&sheet, BoundaryQuery::combined().recursive())
            .unwrap();
        assert_eq!(all.of_dim(1).len(), 4);
        assert_eq!(all.of_dim(0).len(), 4);
    }

    #[test]
    fn fragment_carves_solid_and_keeps_object_tag() {
        let mut eng = InMemoryEngine::new();
        eng.load_scene(&cube());
        let domain = eng
            .add_box(&BoundingBox::new([-2.0; 3], [3.0; 3]))
            .unwrap();
        let tools = eng.entities(Some(3)).difference(&EntitySet::from(vec![domain]));
        let out = eng
            .fragment(&EntitySet::from(vec![domain]), &tools)
            .unwrap();
        assert_eq!(out.per_input.len(), 2);
        assert_eq!(out.per_input[0], EntitySet::from(vec![domain, DimTag::volume(1)]));
        let fluid_faces = eng
            .boundary(&EntitySet::from(vec![domain]), BoundaryQuery::per_entity())
            .unwrap();
        assert_eq!(fluid_faces.len(), 12);
    }

    #[test]
    fn surface_loop_requires_closed_shell() {
        let mut eng = InMemoryEngine::new();
        eng.load_scene(&Scene {
            shapes: vec![ShapeSpec::Shell {
                min: [0.0; 3],
                max: [1.0; 3],
            }],
        });
        let faces = eng.entities(Some(2));
        let mut open = faces.clone();
        open = open.iter().copied().skip(1).collect();
        assert!(matches!(
            eng.add_volume_from_surfaces(&open),
            Err(MesherError::Geometry(_))
        ));
        let vol = eng.add_volume_from_surfaces(&faces).unwrap();
        assert_eq!(vol, DimTag::volume(1));
    }

    #[test]
    fn lattice_counts_skip_nested_volume() {
        let mut eng = InMemoryEngine::new();
        eng.load_scene(&cube());
        let domain = eng
            .add_box(&BoundingBox::new([-1.0; 3], [2.0; 3]))
            .unwrap();
        eng.fragment(&EntitySet::from(vec![domain]), &EntitySet::from(vec![DimTag::volume(1)]))
            .unwrap();
        eng.set_option("Mesh.MeshSizeMax", 1.0.into()).unwrap();
        eng.generate(3).unwrap();
        // 27 domain cells minus the one occupied by the cube, plus the cube's own cell.
        assert_eq!(eng.element_count(ElementKind::Hex), 26 + 1);
        assert_eq!(eng.generation_log().len(), 1);
    }

    #[test]
    fn surface_fault_depends_on_algorithm() {
        let mut eng = InMemoryEngine::with_faults(FaultPlan {
            surface_fails_with_algorithms: vec![6],
            ..FaultPlan::default()
        });
        eng.load_scene(&cube());
        eng.set_option("Mesh.Algorithm", 6.into()).unwrap();
        assert!(matches!(
            eng.generate(2),
            Err(MesherError::MeshGeneration {
                stage: MeshStage::Surface,
                ..
            })
        ));
        eng.set_option("Mesh.Algorithm", 5.into()).unwrap();
        eng.generate(2).unwrap();
        assert_eq!(eng.element_count(ElementKind::Quad), 6);
    }

    #[test]
    fn tiny_spacing_coarsens_instead_of_overflowing() {
        let n = InMemoryEngine::divisions([5.0; 3], 1e-7);
        let cells: usize = n.iter().product();
        assert!(cells > 0 && cells <= MAX_CELLS_PER_ENTITY);
        assert!(n.iter().all(|&k| k == n[0]));
    }
}
