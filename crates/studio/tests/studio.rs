use glam::{Mat4, Vec3};
use image::{Rgba, RgbaImage};
use kiln_gpu::headless::{GpuCommand, HeadlessBackend};
use kiln_gpu::{
    ColorTarget, CubeSources, GpuContext, ResourceId, TextureKind, UniformLocation,
};
use kiln_scene::{parse_obj, Camera};
use kiln_studio::{LitModule, ModuleHandle, SkyboxModule, Studio, StudioConfig, StudioError};

type HeadlessStudio = Studio<HeadlessBackend>;

const TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

fn studio() -> HeadlessStudio {
    Studio::new(
        GpuContext::new(HeadlessBackend::new(320, 240)),
        StudioConfig {
            bake_size: 16,
            ..StudioConfig::default()
        },
    )
}

fn solid(size: u32, shade: u8) -> RgbaImage {
    RgbaImage::from_pixel(size, size, Rgba([shade, shade, shade, 255]))
}

fn solid_faces(size: u32) -> CubeSources {
    CubeSources {
        posx: solid(size, 10).into(),
        negx: solid(size, 20).into(),
        posy: solid(size, 30).into(),
        negy: solid(size, 40).into(),
        posz: solid(size, 50).into(),
        negz: solid(size, 60).into(),
    }
}

fn register_lit(studio: &mut HeadlessStudio) -> ModuleHandle<LitModule> {
    let doc = parse_obj(TRIANGLE);
    pollster::block_on(studio.register(async |s: &mut HeadlessStudio| {
        let mut lit = LitModule::create(s)?;
        lit.add(s.ctx_mut(), &doc)?;
        Ok(lit)
    }))
    .unwrap()
}

fn register_skybox(studio: &mut HeadlessStudio) -> ModuleHandle<SkyboxModule> {
    let faces = solid_faces(4);
    pollster::block_on(studio.register(async |s: &mut HeadlessStudio| SkyboxModule::load(s, faces).await))
        .unwrap()
}

fn read_mat4(bytes: &[u8], offset: u32) -> Mat4 {
    let offset = offset as usize;
    let floats: Vec<f32> = bytes[offset..offset + 64]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    Mat4::from_cols_slice(&floats)
}

#[test]
fn render_follows_registration_order() {
    let mut studio = studio();
    let lit = register_lit(&mut studio);
    let sky = register_skybox(&mut studio);
    assert_eq!((lit.index(), sky.index()), (0, 1));

    let lit_program = studio.module(lit).unwrap().program().id();
    studio.ctx_mut().backend_mut().take_commands();
    studio.render(&Camera::default()).unwrap();

    let commands = studio.ctx().backend().commands();
    assert!(matches!(commands[0], GpuCommand::Clear(_)));
    let programs: Vec<_> = studio.ctx().backend().draws().map(|d| d.program).collect();
    assert_eq!(programs.len(), 2);
    assert_eq!(programs[0], lit_program);
    assert_ne!(programs[1], lit_program);
}

#[test]
fn lit_item_draws_each_vertex() {
    let mut studio = studio();
    let lit = register_lit(&mut studio);
    studio.render(&Camera::default()).unwrap();

    let draw = studio.ctx().backend().draws().next().unwrap();
    assert_eq!((draw.first, draw.count), (0, 3));
    assert_eq!(draw.target.color, ColorTarget::Surface);

    let module = studio.module_mut(lit).unwrap();
    module.items[0].skip = true;
    studio.ctx_mut().backend_mut().take_commands();
    studio.render(&Camera::default()).unwrap();
    assert_eq!(studio.ctx().backend().draws().count(), 0);
}

#[test]
fn lit_render_leaves_texture_units_empty() {
    let mut studio = studio();
    register_lit(&mut studio);
    studio.render(&Camera::default()).unwrap();
    let state = studio.ctx().bind_state();
    assert_eq!(state.active_unit, 0);
    assert!(state.units.iter().all(|u| u.plane.is_none() && u.cube.is_none()));
}

#[test]
fn modules_share_registered_program() {
    let mut studio = studio();
    let a = register_lit(&mut studio);
    let b = register_lit(&mut studio);
    let id_a = studio.module(a).unwrap().program().id();
    let id_b = studio.module(b).unwrap().program().id();
    assert_eq!(id_a, id_b);
    assert_eq!(studio.programs().names().collect::<Vec<_>>(), ["lit"]);

    register_skybox(&mut studio);
    assert_eq!(studio.programs().names().collect::<Vec<_>>(), ["lit", "skybox"]);
}

#[test]
fn bake_clears_six_faces_in_layer_order() {
    let mut studio = studio();
    register_skybox(&mut studio);
    studio.ctx_mut().backend_mut().take_commands();

    let cube = studio.render_cubemap(&Camera::default()).unwrap();
    assert_eq!(cube.kind, TextureKind::Cube);
    assert_eq!((cube.width, cube.height, cube.mip_levels), (16, 16, 1));

    let backend = studio.ctx().backend();
    let layers: Vec<u32> = backend
        .clears()
        .map(|c| match c.target.color {
            ColorTarget::Texture { id, layer } => {
                assert_eq!(id, cube.id);
                layer
            }
            ColorTarget::Surface => panic!("bake cleared the surface"),
        })
        .collect();
    assert_eq!(layers, [0, 1, 2, 3, 4, 5]);
    assert!(backend.clears().all(|c| c.viewport.width == 16 && c.viewport.height == 16));
    assert_eq!(backend.draws().count(), 6);
    assert!(matches!(backend.commands().last(), Some(GpuCommand::Flush)));
}

#[test]
fn bake_renders_each_face_camera() {
    let mut studio = studio();
    let sky = register_skybox(&mut studio);
    studio.ctx_mut().backend_mut().take_commands();

    let camera = Camera {
        position: Vec3::new(3.0, -1.0, 2.0),
        ..Camera::default()
    };
    studio.render_cubemap(&camera).unwrap();

    assert!(studio.module(sky).is_some());
    let program = studio.programs().get("skybox").unwrap();
    let UniformLocation::Member { offset, .. } = program.uniform("inverse_view_projection").unwrap() else {
        panic!("inverse_view_projection is not a block member");
    };

    // Layer order with the GL cube-map up vectors.
    let faces = [
        (Vec3::X, Vec3::NEG_Y),
        (Vec3::NEG_X, Vec3::NEG_Y),
        (Vec3::Y, Vec3::Z),
        (Vec3::NEG_Y, Vec3::NEG_Z),
        (Vec3::Z, Vec3::NEG_Y),
        (Vec3::NEG_Z, Vec3::NEG_Y),
    ];
    let draws: Vec<_> = studio.ctx().backend().draws().collect();
    assert_eq!(draws.len(), 6);
    for (draw, (direction, up)) in draws.iter().zip(faces) {
        let centred = Camera {
            position: Vec3::ZERO,
            direction,
            up,
            ..Camera::default()
        };
        let want = centred.view_projection().inverse();
        let got = read_mat4(&draw.uniforms, offset);
        assert!(got.abs_diff_eq(want, 1e-5), "face looking {direction}");
    }
}

#[test]
fn baked_cube_can_replace_the_skybox() {
    let mut studio = studio();
    let sky = register_skybox(&mut studio);
    let baked = studio.render_cubemap(&Camera::default()).unwrap();
    studio.module_mut(sky).unwrap().set_texture(baked);

    studio.ctx_mut().backend_mut().take_commands();
    studio.render(&Camera::default()).unwrap();
    let draw = studio.ctx().backend().draws().next().unwrap();
    assert_eq!(draw.textures[0].texture, Some(baked.id));
}

#[test]
fn rebake_moves_the_skybox_to_the_new_cube() {
    let mut studio = studio();
    let sky = register_skybox(&mut studio);
    let lit = register_lit(&mut studio);

    let first = studio.render_cubemap(&Camera::default()).unwrap();
    studio.module_mut(sky).unwrap().set_texture(first);
    studio.module_mut(lit).unwrap().items[0].cube = Some(first);
    studio.render(&Camera::default()).unwrap();

    let second = studio.render_cubemap(&Camera::default()).unwrap();
    studio.replace_texture(first, second).unwrap();
    assert!(!studio.ctx().live_resources().contains(&ResourceId::TextureId(first.id)));
    assert_eq!(studio.module(sky).unwrap().texture().id, second.id);
    assert_eq!(studio.module(lit).unwrap().items[0].cube, Some(second));

    studio.ctx_mut().backend_mut().take_commands();
    studio.render(&Camera::default()).unwrap();
    let draws: Vec<_> = studio.ctx().backend().draws().collect();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].textures[0].texture, Some(second.id));
}

#[test]
fn replace_texture_leaves_other_textures_alone() {
    let mut studio = studio();
    let sky = register_skybox(&mut studio);
    let loaded = studio.module(sky).unwrap().texture();
    let first = studio.render_cubemap(&Camera::default()).unwrap();
    let second = studio.render_cubemap(&Camera::default()).unwrap();

    studio.replace_texture(first, second).unwrap();
    assert_eq!(studio.module(sky).unwrap().texture(), loaded);
    studio.render(&Camera::default()).unwrap();
}

#[test]
fn partial_face_still_uploads() {
    let doc = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\nf 1 2 9\n");
    assert_eq!(doc.warnings.len(), 1);
    assert_eq!(doc.vertex_count(), 5);

    let mut studio = studio();
    let lit = pollster::block_on(studio.register(async |s: &mut HeadlessStudio| {
        let mut lit = LitModule::create(s)?;
        lit.add(s.ctx_mut(), &doc)?;
        Ok(lit)
    }))
    .unwrap();
    assert_eq!(studio.module(lit).unwrap().items[0].vertex_arrays[0].1, 3);

    studio.render(&Camera::default()).unwrap();
    let draw = studio.ctx().backend().draws().next().unwrap();
    assert_eq!(draw.count, 3);
}

#[test]
fn lone_partial_face_adds_an_empty_item() {
    let doc = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n");
    let mut studio = studio();
    let lit = pollster::block_on(studio.register(async |s: &mut HeadlessStudio| {
        let mut lit = LitModule::create(s)?;
        lit.add(s.ctx_mut(), &doc)?;
        Ok(lit)
    }))
    .unwrap();
    assert!(studio.module(lit).unwrap().items[0].vertex_arrays.is_empty());
    studio.render(&Camera::default()).unwrap();
    assert_eq!(studio.ctx().backend().draws().count(), 0);
}

#[test]
fn failed_render_discards_recorded_work() {
    let mut studio = studio();
    let sky = register_skybox(&mut studio);
    let cube = studio.module(sky).unwrap().texture();
    studio.ctx_mut().release(cube.id).unwrap();

    studio.ctx_mut().backend_mut().take_commands();
    let err = studio.render(&Camera::default()).unwrap_err();
    assert!(matches!(err, StudioError::Gpu(_)));
    let commands = studio.ctx().backend().commands();
    assert!(matches!(commands[0], GpuCommand::Clear(_)));
    assert!(matches!(commands.last(), Some(GpuCommand::Discard)));
    assert!(!commands.iter().any(|c| matches!(c, GpuCommand::Flush)));
}

#[test]
fn failed_bake_discards_recorded_faces() {
    let mut studio = studio();
    let sky = register_skybox(&mut studio);
    let cube = studio.module(sky).unwrap().texture();
    studio.ctx_mut().release(cube.id).unwrap();
    let live_before = studio.ctx().live_resources().len();

    studio.ctx_mut().backend_mut().take_commands();
    assert!(studio.render_cubemap(&Camera::default()).is_err());
    let commands = studio.ctx().backend().commands();
    assert!(commands.iter().any(|c| matches!(c, GpuCommand::Discard)));
    assert!(!commands.iter().any(|c| matches!(c, GpuCommand::Flush)));
    assert_eq!(studio.ctx().live_resources().len(), live_before);
}

#[test]
fn skybox_loads_faces_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    for (name, shade) in [("posx", 1), ("negx", 2), ("posy", 3), ("negy", 4), ("posz", 5), ("negz", 6)] {
        solid(8, shade).save(dir.path().join(format!("{name}.png"))).unwrap();
    }
    let mut studio = studio();
    let sources = CubeSources::from_dir(dir.path(), "png");
    let sky = pollster::block_on(
        studio.register(async |s: &mut HeadlessStudio| SkyboxModule::load(s, sources).await),
    )
    .unwrap();
    let cube = studio.module(sky).unwrap().texture();
    assert_eq!((cube.width, cube.mip_levels), (8, 4));
}

#[test]
fn failed_factory_registers_nothing() {
    let mut studio = studio();
    let mut faces = solid_faces(4);
    faces.negz = solid(2, 0).into();
    let err = pollster::block_on(
        studio.register(async |s: &mut HeadlessStudio| SkyboxModule::load(s, faces).await),
    )
    .unwrap_err();
    assert!(matches!(err, StudioError::Texture(_)));
    assert!(studio.modules().is_empty());
}

#[test]
fn teardown_releases_everything() {
    let mut studio = studio();
    register_lit(&mut studio);
    register_skybox(&mut studio);
    studio.render_cubemap(&Camera::default()).unwrap();
    assert!(!studio.ctx().backend().live().is_empty());

    studio.teardown();
    assert!(studio.modules().is_empty());
    assert!(studio.programs().is_empty());
    assert!(studio.ctx().live_resources().is_empty());
    assert!(studio.ctx().backend().live().is_empty());
    let released = studio
        .ctx()
        .backend()
        .commands()
        .iter()
        .filter(|c| matches!(c, GpuCommand::Release(ResourceId::TextureId(_))))
        .count();
    assert_eq!(released, 2);
}
