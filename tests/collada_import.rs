//! Integration tests for the Collada importer

mod common;

use std::sync::Arc;

use archetype_import::spatial::scene_bounds;
use archetype_import::{
    ColladaImporter, ImportRequest, MaterialKind, MaterialProperty, MemoryFetcher,
};
use common::{pipeline, png, quiet_progress};
use futures::executor::block_on;
use glam::Vec3;

/// Textured Phong panel spanning 4 x 2 units in the document's XZ plane
fn document(meter: f32, up_axis: &str) -> String {
    format!(
        r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset>
    <unit name="unit" meter="{meter}"/>
    <up_axis>{up_axis}</up_axis>
  </asset>
  <library_images>
    <image id="diffuse-img"><init_from>diffuse.png</init_from></image>
    <image id="specular-img"><init_from>specular.png</init_from></image>
  </library_images>
  <library_effects>
    <effect id="panel-fx">
      <profile_COMMON>
        <newparam sid="diffuse-surface"><surface type="2D"><init_from>diffuse-img</init_from></surface></newparam>
        <newparam sid="diffuse-sampler"><sampler2D><source>diffuse-surface</source></sampler2D></newparam>
        <newparam sid="specular-surface"><surface type="2D"><init_from>specular-img</init_from></surface></newparam>
        <newparam sid="specular-sampler"><sampler2D><source>specular-surface</source></sampler2D></newparam>
        <technique sid="common">
          <phong>
            <diffuse><texture texture="diffuse-sampler" texcoord="UVMap"/></diffuse>
            <specular><texture texture="specular-sampler" texcoord="UVMap"/></specular>
            <shininess><float>20</float></shininess>
          </phong>
        </technique>
      </profile_COMMON>
    </effect>
  </library_effects>
  <library_materials>
    <material id="panel-mat" name="Panel"><instance_effect url="#panel-fx"/></material>
  </library_materials>
  <library_geometries>
    <geometry id="panel-mesh" name="Panel">
      <mesh>
        <source id="panel-positions">
          <float_array id="panel-positions-array" count="12">0 0 0 4 0 0 4 0 2 0 0 2</float_array>
          <technique_common><accessor source="#panel-positions-array" count="4" stride="3"/></technique_common>
        </source>
        <vertices id="panel-vertices"><input semantic="POSITION" source="#panel-positions"/></vertices>
        <triangles material="panel-symbol" count="2">
          <input semantic="VERTEX" source="#panel-vertices" offset="0"/>
          <p>0 1 2 0 2 3</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="scene" name="Scene">
      <node id="panel" name="Panel">
        <instance_geometry url="#panel-mesh">
          <bind_material><technique_common>
            <instance_material symbol="panel-symbol" target="#panel-mat"/>
          </technique_common></bind_material>
        </instance_geometry>
      </node>
    </visual_scene>
  </library_visual_scenes>
  <scene><instance_visual_scene url="#scene"/></scene>
</COLLADA>"##
    )
}

fn fetcher(meter: f32, up_axis: &str) -> MemoryFetcher {
    MemoryFetcher::new()
        .with_resource("models/panel.dae", document(meter, up_axis))
        .with_resource("models/diffuse.png", png([255, 255, 255, 255]))
        .with_resource("models/specular.png", png([90, 90, 90, 255]))
}

#[test]
fn test_phong_becomes_standard() {
    common::init_logging();
    let fetcher = fetcher(1.0, "Y_UP");
    let importer = ColladaImporter::new();

    let mut root = block_on(importer.decode("models/panel.dae", &fetcher, &quiet_progress())).unwrap();
    let phong = root.materials()[0].read().clone();
    assert_eq!(phong.kind(), MaterialKind::Phong);
    assert_eq!(phong.name(), Some("Panel"));
    let diffuse = phong.texture(MaterialProperty::Map).unwrap().clone();
    let specular = phong.texture(MaterialProperty::SpecularMap).unwrap().clone();

    let report = importer.post_process(&mut root);
    assert_eq!(report.replaced, 1);
    assert_eq!(report.released_textures, 1);

    let standard = root.materials()[0].read().clone();
    assert_eq!(standard.kind(), MaterialKind::Standard);
    assert_eq!(standard.scalar(MaterialProperty::Roughness), Some(0.0));
    assert_eq!(standard.scalar(MaterialProperty::Metalness), Some(0.0));
    assert!(Arc::ptr_eq(standard.texture(MaterialProperty::Map).unwrap(), &diffuse));
    assert!(!diffuse.is_disposed());
    assert!(specular.is_disposed());
}

#[test]
fn test_textures_fetched_beside_document() {
    let fetcher = fetcher(1.0, "Y_UP");
    block_on(ColladaImporter::new().decode("models/panel.dae", &fetcher, &quiet_progress())).unwrap();

    assert_eq!(fetcher.request_count_for("models/diffuse.png"), 1);
    assert_eq!(fetcher.request_count_for("models/specular.png"), 1);
}

#[test]
fn test_unit_scale_does_not_shrink_model() {
    let centimeters = Arc::new(fetcher(0.01, "Y_UP"));
    let meters = Arc::new(fetcher(1.0, "Y_UP"));

    let decoded = block_on(ColladaImporter::new().decode(
        "models/panel.dae",
        centimeters.as_ref(),
        &quiet_progress(),
    ))
    .unwrap();
    assert_eq!(decoded.transform.scale, Vec3::splat(0.01));

    let (small, _) = pipeline(centimeters);
    let (large, _) = pipeline(meters);
    let request = ImportRequest::new("models/panel.dae");
    let small = block_on(small.import(&request)).unwrap();
    let large = block_on(large.import(&request)).unwrap();

    // half diagonal of a 4 x 0 x 2 box
    let expected = 1.0 / 5.0_f32.sqrt();
    assert!((small.root.transform.scale.x - expected).abs() < 1e-5);
    assert_eq!(small.root.transform.scale, large.root.transform.scale);
}

#[test]
fn test_z_up_is_rotated_to_y_up() {
    let (pipeline, _) = pipeline(Arc::new(fetcher(1.0, "Z_UP")));
    let result = block_on(pipeline.import(&ImportRequest::new("models/panel.dae"))).unwrap();

    let up = result.root.transform.rotation * Vec3::Z;
    assert!((up - Vec3::Y).length() < 1e-5);

    let bounds = scene_bounds(&result.root, result.root.transform.matrix()).unwrap();
    let size = bounds.size();
    assert!(size.y > 0.5);
    assert!(size.z.abs() < 1e-5);
}
