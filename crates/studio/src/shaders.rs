//! Built-in WGSL programs.

macro_rules! lit_uniforms {
    () => {
        r#"
struct LitUniforms {
    mvp: mat4x4<f32>,
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    light_color: vec3<f32>,
    ka: f32,
    light_position: vec3<f32>,
    kd: f32,
    view_position: vec3<f32>,
    ks: f32,
    color: vec3<f32>,
    shininess: f32,
    mode: i32,
    use_normal_map: i32,
};

@group(0) @binding(0)
var<uniform> u: LitUniforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) texcoord: vec2<f32>,
};
"#
    };
}

pub const LIT_VERTEX: &str = concat!(
    lit_uniforms!(),
    r#"
@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) texcoord: vec2<f32>,
) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = u.mvp * vec4<f32>(position, 1.0);
    out.world_position = (u.model * vec4<f32>(position, 1.0)).xyz;
    out.world_normal = (u.normal_matrix * vec4<f32>(normal, 0.0)).xyz;
    out.texcoord = texcoord;
    return out;
}
"#
);

/// Phong shading. `mode` 1 uses the flat item colour, 2 the plane texture,
/// 3 a reflection into the cube texture.
pub const LIT_FRAGMENT: &str = concat!(
    lit_uniforms!(),
    r#"
@group(1) @binding(0) var plane_texture: texture_2d<f32>;
@group(1) @binding(1) var cube_texture: texture_cube<f32>;
@group(1) @binding(2) var normal_map: texture_2d<f32>;
@group(1) @binding(3) var linear_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var n = normalize(in.world_normal);
    let bump = textureSample(normal_map, linear_sampler, in.texcoord).rgb * 2.0 - 1.0;
    if (u.use_normal_map != 0) {
        n = normalize(n + bump);
    }

    let view_dir = normalize(u.view_position - in.world_position);
    let plane = textureSample(plane_texture, linear_sampler, in.texcoord).rgb;
    let reflected = textureSample(cube_texture, linear_sampler, reflect(-view_dir, n)).rgb;

    var base = u.color;
    if (u.mode == 2) {
        base = plane;
    } else if (u.mode == 3) {
        base = reflected;
    }

    let light_dir = normalize(u.light_position - in.world_position);
    let diffuse = max(dot(n, light_dir), 0.0);
    let reflect_dir = reflect(-light_dir, n);
    let specular = pow(max(dot(view_dir, reflect_dir), 0.0), u.shininess);

    let ambient = u.ka * base;
    let lit = ambient + u.kd * diffuse * base * u.light_color + u.ks * specular * u.light_color;
    return vec4<f32>(lit, 1.0);
}
"#
);

/// Full-screen quad at the far plane.
pub const SKYBOX_VERTEX: &str = r#"
struct SkyboxOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>) -> SkyboxOutput {
    var out: SkyboxOutput;
    out.clip_position = vec4<f32>(position, 1.0, 1.0);
    out.ndc = position;
    return out;
}
"#;

pub const SKYBOX_FRAGMENT: &str = r#"
struct SkyboxUniforms {
    inverse_view_projection: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> u: SkyboxUniforms;

@group(1) @binding(0) var skybox: texture_cube<f32>;
@group(1) @binding(1) var skybox_sampler: sampler;

@fragment
fn fs_main(@location(0) ndc: vec2<f32>) -> @location(0) vec4<f32> {
    let t = u.inverse_view_projection * vec4<f32>(ndc, 1.0, 1.0);
    return textureSample(skybox, skybox_sampler, normalize(t.xyz / t.w));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_gpu::{ProgramLayout, TextureKind, UniformLocation};

    #[test]
    fn lit_program_links() {
        let layout = ProgramLayout::link([LIT_VERTEX, LIT_FRAGMENT]).unwrap();
        assert_eq!(layout.attributes.len(), 3);
        assert_eq!(layout.textures.len(), 3);
        assert_eq!(layout.textures[1].kind, TextureKind::Cube);
        assert!(matches!(
            layout.uniform("mode"),
            Some(UniformLocation::Member { offset: 256, .. })
        ));
    }

    #[test]
    fn skybox_program_links() {
        let layout = ProgramLayout::link([SKYBOX_VERTEX, SKYBOX_FRAGMENT]).unwrap();
        assert_eq!(layout.attribute("position").unwrap().components, 2);
        assert_eq!(layout.block_size(), 64);
    }
}
