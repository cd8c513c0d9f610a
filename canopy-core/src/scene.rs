//! Flat scene description for external viewers.
//!
//! Each organ mesh becomes a named shape with a transform and a material.
//! Mirrored border plants reuse their source meshes under a translation.

use crate::geometry::OrganMesh;
use crate::phenology::DevelopmentStage;
use crate::snapshot::CanopySnapshot;
use crate::types::{OrganKind, PlantId};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Linear RGB in `[0, 1]`.
    pub color: [f32; 3],
    pub specular: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneShape {
    pub name: String,
    pub material: String,
    /// Column-major 4×4 transform.
    pub transform: [[f32; 4]; 4],
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub shapes: Vec<SceneShape>,
    pub materials: BTreeMap<String, Material>,
}

impl Scene {
    pub fn triangle_count(&self) -> usize {
        self.shapes.iter().map(|s| s.triangles.len()).sum()
    }
}

fn material_name(kind: OrganKind, stage: DevelopmentStage) -> String {
    let state = match stage {
        DevelopmentStage::Senescent => "senescent",
        DevelopmentStage::Dead => "dead",
        _ => "green",
    };
    format!("{}_{state}", kind.name())
}

fn material(kind: OrganKind, stage: DevelopmentStage) -> Material {
    let color = match stage {
        DevelopmentStage::Senescent => [0.78, 0.72, 0.32],
        DevelopmentStage::Dead => [0.55, 0.42, 0.25],
        _ => match kind {
            OrganKind::Blade => [0.20, 0.55, 0.15],
            OrganKind::Sheath => [0.30, 0.60, 0.20],
            OrganKind::Internode => [0.45, 0.65, 0.25],
            OrganKind::Ear => [0.60, 0.70, 0.30],
        },
    };
    Material {
        color,
        specular: if kind == OrganKind::Blade { 0.1 } else { 0.05 },
    }
}

fn shape(organ: &OrganMesh, name: String, transform: Mat4) -> SceneShape {
    SceneShape {
        name,
        material: material_name(organ.kind, organ.stage),
        transform: transform.to_cols_array_2d(),
        vertices: organ.mesh.positions.iter().map(|p| p.to_array()).collect(),
        normals: organ.mesh.normals.iter().map(|n| n.to_array()).collect(),
        triangles: organ.mesh.triangles.clone(),
    }
}

/// Builds the scene of a snapshot, reconstructing geometry if needed.
///
/// Shapes are named `p{plant}_a{axis}_m{metamer}_{kind}`; mirrored copies
/// append `_mirror{n}`, `n` being the index in the stand's mirror list.
pub fn scene_from_snapshot(snapshot: &CanopySnapshot, include_mirrors: bool) -> Scene {
    let mut scene = Scene::default();
    let geometry = snapshot.geometry();

    let mut add = |plant: PlantId, organ: &OrganMesh, suffix: &str, transform: Mat4| {
        let name = format!(
            "p{plant}_a{}_m{}_{}{suffix}",
            organ.axis,
            organ.metamer,
            organ.kind.name()
        );
        scene
            .materials
            .entry(material_name(organ.kind, organ.stage))
            .or_insert_with(|| material(organ.kind, organ.stage));
        scene.shapes.push(shape(organ, name, transform));
    };

    for plant in geometry {
        for organ in &plant.organs {
            add(plant.plant, organ, "", Mat4::IDENTITY);
        }
    }

    if include_mirrors {
        for (n, mirror) in snapshot.layout().mirrors.iter().enumerate() {
            let Some(source) = geometry.get(mirror.source) else {
                continue;
            };
            let offset = Vec3::new(mirror.offset[0] as f32, mirror.offset[1] as f32, 0.0);
            let suffix = format!("_mirror{n}");
            for organ in &source.organs {
                add(source.plant, organ, &suffix, Mat4::from_translation(offset));
            }
        }
    }
    scene
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::params::{GenotypeParameters, ParameterTable};
    use crate::simulation::Simulation;
    use crate::thermal::TemperatureSeries;
    use chrono::{Duration, NaiveDate};

    fn snapshot(wrap_borders: bool) -> CanopySnapshot {
        let sowing = NaiveDate::from_ymd_opt(2010, 10, 15).unwrap();
        let table =
            ParameterTable::new(vec![GenotypeParameters::reference("Mercia", sowing)]).unwrap();
        let weather =
            TemperatureSeries::from_daily((0..120).map(|i| (sowing + Duration::days(i), 12.0)));
        let config = SimConfig {
            density: 16.0,
            plot_width: 0.5,
            plot_height: 0.5,
            wrap_borders,
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(config, &table, &weather).unwrap();
        sim.step_to(sowing + Duration::days(90)).unwrap()
    }

    #[test]
    fn every_organ_mesh_becomes_a_shape() {
        let snap = snapshot(false);
        let scene = scene_from_snapshot(&snap, false);
        let organs: usize = snap.geometry().iter().map(|g| g.organs.len()).sum();

        assert!(organs > 0);
        assert_eq!(scene.shapes.len(), organs);
        for s in &scene.shapes {
            assert!(scene.materials.contains_key(&s.material));
            assert_eq!(s.transform, Mat4::IDENTITY.to_cols_array_2d());
            assert_eq!(s.vertices.len(), s.normals.len());
        }
    }

    #[test]
    fn mirrors_reuse_source_meshes_with_a_translation() {
        let snap = snapshot(true);
        assert!(!snap.layout().mirrors.is_empty());
        let plain = scene_from_snapshot(&snap, false);
        let mirrored = scene_from_snapshot(&snap, true);

        assert!(mirrored.shapes.len() > plain.shapes.len());
        let copy = mirrored
            .shapes
            .iter()
            .find(|s| s.name.contains("_mirror"))
            .unwrap();
        assert_ne!(copy.transform, Mat4::IDENTITY.to_cols_array_2d());
        let source_name = copy.name.split("_mirror").next().unwrap();
        let source = plain.shapes.iter().find(|s| s.name == source_name).unwrap();
        assert_eq!(copy.vertices, source.vertices);
    }

    #[test]
    fn scene_serialises_to_json() {
        let scene = scene_from_snapshot(&snapshot(false), false);
        let json = serde_json::to_string(&scene).unwrap();
        let back: Scene = serde_json::from_str(&json).unwrap();
        assert_eq!(back.shapes.len(), scene.shapes.len());
    }
}
