//! Triangulated organ surfaces.
//!
//! Geometry is derived state: [`reconstruct_plant`] is a pure function of a
//! plant's topology, its sampled dimensions and orientations, and the
//! thermal time. Nothing here is stored back into the simulation.
//!
//! The frame is right-handed with `z` up; lengths are in metres.

use crate::dimensions::{AxisOrientation, OrganOrientation};
use crate::phenology::DevelopmentStage;
use crate::shapes::{BladeShape, ShapeDatabase};
use crate::topology::{Plant, PlantTopology};
use crate::types::{AxisId, MetamerId, OrganId, OrganKind, PlantId, ThermalTime};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// Sheaths wrap the stem slightly wider than the internode.
const SHEATH_RADIUS_FACTOR: f32 = 1.15;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    /// Unit normal per vertex.
    pub normals: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Total triangle area.
    pub fn area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|&[a, b, c]| {
                let (a, b, c) = (
                    self.positions[a as usize],
                    self.positions[b as usize],
                    self.positions[c as usize],
                );
                0.5 * f64::from((b - a).cross(c - a).length())
            })
            .sum()
    }

    pub fn translate(&mut self, offset: Vec3) {
        for p in &mut self.positions {
            *p += offset;
        }
    }

    /// Appends `other`, re-indexing its triangles.
    pub fn append(&mut self, other: &Mesh) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.triangles
            .extend(other.triangles.iter().map(|t| t.map(|i| i + base)));
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3) -> u32 {
        let id = self.positions.len() as u32;
        self.positions.push(position);
        self.normals.push(normal.normalize_or(Vec3::Z));
        id
    }

    /// Side triangles between consecutive rings of `sides` vertices.
    fn stitch_rings(&mut self, first: u32, rings: usize, sides: usize) {
        let sides = sides as u32;
        for ring in 0..rings.saturating_sub(1) as u32 {
            let lo = first + ring * sides;
            let hi = lo + sides;
            for k in 0..sides {
                let next = (k + 1) % sides;
                self.triangles.push([lo + k, lo + next, hi + next]);
                self.triangles.push([lo + k, hi + next, hi + k]);
            }
        }
    }
}

/// Tessellation settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryOptions {
    /// Polygon sides of internodes, sheaths and ears.
    pub tube_sides: usize,
    /// Stations along a blade midrib.
    pub blade_stations: usize,
    /// Rings along an ear.
    pub ear_rings: usize,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        Self {
            tube_sides: 8,
            blade_stations: 12,
            ear_rings: 8,
        }
    }
}

/// Emitted instead of a mesh for a visible organ with no extent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DegenerateGeometryWarning {
    pub plant: PlantId,
    pub organ: OrganId,
    pub kind: OrganKind,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrganMesh {
    pub organ: OrganId,
    pub axis: AxisId,
    pub metamer: MetamerId,
    pub kind: OrganKind,
    pub stage: DevelopmentStage,
    pub mesh: Mesh,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlantGeometry {
    pub plant: PlantId,
    pub organs: Vec<OrganMesh>,
    pub warnings: Vec<DegenerateGeometryWarning>,
}

impl PlantGeometry {
    /// All organ meshes of the plant in one mesh.
    pub fn merged(&self) -> Mesh {
        let mut mesh = Mesh::default();
        for organ in &self.organs {
            mesh.append(&organ.mesh);
        }
        mesh
    }

    pub fn area_of(&self, kind: OrganKind) -> f64 {
        self.organs
            .iter()
            .filter(|o| o.kind == kind)
            .map(|o| o.mesh.area())
            .sum()
    }
}

/// Unit direction of an axis.
pub fn axis_direction(orientation: &AxisOrientation) -> Vec3 {
    let (inc, az) = (orientation.inclination as f32, orientation.azimuth as f32);
    Vec3::new(inc.sin() * az.cos(), inc.sin() * az.sin(), inc.cos())
}

/// Unit vector orthogonal to `dir`, pointing towards `azimuth` where possible.
fn facing(dir: Vec3, azimuth: f32) -> Vec3 {
    let h = Vec3::new(azimuth.cos(), azimuth.sin(), 0.0);
    let h = (h - dir * h.dot(dir)).normalize_or_zero();
    if h == Vec3::ZERO {
        dir.any_orthonormal_vector()
    } else {
        h
    }
}

/// Blade surface inserted at `base` on an axis pointing along `axis_dir`.
///
/// The midrib leaves the axis at the sampled inclination and keeps bending
/// by `curvature × s` plus the reference bend of the shape. The half-width
/// at each station is `width × shape_width(s) / 2`.
pub fn blade_mesh(
    base: Vec3,
    axis_dir: Vec3,
    length: f32,
    width: f32,
    orientation: &OrganOrientation,
    shape: &BladeShape,
    stations: usize,
) -> Mesh {
    let n = stations.max(2);
    let toward = facing(axis_dir, orientation.azimuth as f32);
    let side = axis_dir.cross(toward).normalize_or(Vec3::X);
    let heading = |s: f64| -> Vec3 {
        let (_, bend) = shape.at(s);
        let phi = (orientation.inclination + orientation.curvature * s + bend) as f32;
        axis_dir * phi.cos() + toward * phi.sin()
    };

    let step = length / (n - 1) as f32;
    let mut mesh = Mesh::default();
    let mut p = base;
    for i in 0..n {
        let s = i as f64 / (n - 1) as f64;
        if i > 0 {
            let s_mid = (i as f64 - 0.5) / (n - 1) as f64;
            p += heading(s_mid) * step;
        }
        let (rel_width, _) = shape.at(s);
        let half = side * (width * rel_width as f32 * 0.5);
        let normal = heading(s).cross(side);
        mesh.push_vertex(p - half, normal);
        mesh.push_vertex(p + half, normal);
    }
    for i in 0..(n - 1) as u32 {
        let (l0, r0, l1, r1) = (2 * i, 2 * i + 1, 2 * i + 2, 2 * i + 3);
        mesh.triangles.push([l0, r0, l1]);
        mesh.triangles.push([r0, r1, l1]);
    }
    mesh
}

/// Open tapered tube from `start` along `dir`.
pub fn tube_mesh(
    start: Vec3,
    dir: Vec3,
    length: f32,
    radius_bottom: f32,
    radius_top: f32,
    sides: usize,
) -> Mesh {
    let sides = sides.max(3);
    let (u, v) = dir.any_orthonormal_pair();
    let mut mesh = Mesh::default();
    for (t, radius) in [(0.0, radius_bottom), (1.0, radius_top)] {
        let center = start + dir * (length * t);
        for k in 0..sides {
            let theta = TAU * k as f32 / sides as f32;
            let radial = u * theta.cos() + v * theta.sin();
            mesh.push_vertex(center + radial * radius, radial);
        }
    }
    mesh.stitch_rings(0, 2, sides);
    mesh
}

/// Spindle-shaped ear: radius `width/2 × sin(π s)` along its length.
pub fn ear_mesh(start: Vec3, dir: Vec3, length: f32, width: f32, rings: usize, sides: usize) -> Mesh {
    let (rings, sides) = (rings.max(3), sides.max(3));
    let (u, v) = dir.any_orthonormal_pair();
    let mut mesh = Mesh::default();
    for i in 0..rings {
        let s = i as f32 / (rings - 1) as f32;
        let radius = 0.5 * width * (PI * s).sin().max(0.0);
        let center = start + dir * (length * s);
        for k in 0..sides {
            let theta = TAU * k as f32 / sides as f32;
            let radial = u * theta.cos() + v * theta.sin();
            mesh.push_vertex(center + radial * radius, radial);
        }
    }
    mesh.stitch_rings(0, rings, sides);
    mesh
}

struct PlantBuilder<'a> {
    topology: &'a PlantTopology,
    tt: ThermalTime,
    steepness: f64,
    out: PlantGeometry,
}

impl PlantBuilder<'_> {
    fn visible_length(&self, organ: OrganId) -> f32 {
        self.topology
            .displayed_dimensions(organ, self.tt, self.steepness)
            .map_or(0.0, |d| d.length as f32)
    }

    fn warn(&mut self, organ: OrganId, reason: impl Into<String>) {
        let kind = self.topology.organs[organ].kind;
        self.out.warnings.push(DegenerateGeometryWarning {
            plant: self.out.plant,
            organ,
            kind,
            reason: reason.into(),
        });
    }

    /// Builds the mesh of `organ` if it is visible and has an extent.
    fn emit(&mut self, organ: OrganId, build: impl FnOnce(f32, f32) -> Option<Mesh>) {
        let o = &self.topology.organs[organ];
        if !o.stage.is_visible() {
            return;
        }
        let Some(dims) = self.topology.displayed_dimensions(organ, self.tt, self.steepness) else {
            self.warn(organ, "dimensions have not been sampled");
            return;
        };
        if !(dims.length > 0.0 && dims.width > 0.0) {
            self.warn(
                organ,
                format!("zero extent (length {}, width {})", dims.length, dims.width),
            );
            return;
        }
        let Some(mesh) = build(dims.length as f32, dims.width as f32) else {
            self.warn(organ, "unknown blade shape class");
            return;
        };
        let metamer = o.metamer;
        self.out.organs.push(OrganMesh {
            organ,
            axis: self.topology.metamers[metamer].axis,
            metamer,
            kind: o.kind,
            stage: o.stage,
            mesh,
        });
    }
}

/// Meshes of every visible organ of `plant` at `tt`.
///
/// The main stem rises vertically from the plant base. A tiller starts at
/// the node of its parent metamer and leans by its insertion angle. Nodes
/// stack the visible internode lengths; each blade is inserted at the top
/// of its visible sheath, and the ear above the last node.
pub fn reconstruct_plant(
    plant: &Plant,
    tt: ThermalTime,
    steepness: f64,
    shapes: &ShapeDatabase,
    options: &GeometryOptions,
) -> PlantGeometry {
    let topology = &plant.topology;
    let origin = Vec3::new(
        plant.position.x as f32,
        plant.position.y as f32,
        plant.position.z as f32,
    );
    let mut b = PlantBuilder {
        topology,
        tt,
        steepness,
        out: PlantGeometry {
            plant: plant.id,
            ..PlantGeometry::default()
        },
    };

    // Node positions per axis; index k is the top of internode k.
    let mut nodes: Vec<Vec<Vec3>> = Vec::with_capacity(topology.axes.len());
    for axis in &topology.axes {
        let base = axis
            .parent
            .and_then(|m| {
                let pm = &topology.metamers[m];
                nodes.get(pm.axis)?.get(pm.rank as usize).copied()
            })
            .unwrap_or(origin);
        let dir = axis_direction(&axis.orientation);
        let mut axis_nodes = Vec::with_capacity(axis.metamers.len() + 1);
        axis_nodes.push(base);
        let mut top = base;

        for &mid in &axis.metamers {
            let metamer = &topology.metamers[mid];
            let below = top;
            top = below + dir * b.visible_length(metamer.internode);
            axis_nodes.push(top);

            b.emit(metamer.internode, |length, width| {
                let r = 0.5 * width;
                Some(tube_mesh(below, dir, length, r, r * 0.9, options.tube_sides))
            });
            b.emit(metamer.sheath, |length, width| {
                let r = 0.5 * width * SHEATH_RADIUS_FACTOR;
                Some(tube_mesh(top, dir, length, r, r, options.tube_sides))
            });

            let collar = top + dir * b.visible_length(metamer.sheath);
            let blade = &topology.organs[metamer.blade];
            let orientation = blade.orientation.unwrap_or_default();
            let shape = shapes.get(blade.shape_class);
            b.emit(metamer.blade, |length, width| {
                shape.map(|shape| {
                    blade_mesh(
                        collar,
                        dir,
                        length,
                        width,
                        &orientation,
                        shape,
                        options.blade_stations,
                    )
                })
            });

            if let Some(ear) = metamer.ear {
                b.emit(ear, |length, width| {
                    Some(ear_mesh(
                        collar,
                        dir,
                        length,
                        width,
                        options.ear_rings,
                        options.tube_sides,
                    ))
                });
            }
        }
        nodes.push(axis_nodes);
    }

    if !b.out.warnings.is_empty() {
        tracing::debug!(
            plant = plant.id,
            warnings = b.out.warnings.len(),
            "degenerate organs skipped"
        );
    }
    b.out
}
