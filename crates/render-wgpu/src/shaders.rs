/// Shared camera uniforms, bound at group 0 by every pipeline.
const UNIFORMS: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    inv_sky_view_proj: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;
"#;

const GRID: &str = r#"
struct GridVertex {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
};

struct GridOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_grid(vertex: GridVertex) -> GridOutput {
    var out: GridOutput;
    out.clip_position = uniforms.view_proj * vec4<f32>(vertex.position, 1.0);
    out.color = vertex.color;
    return out;
}

@fragment
fn fs_grid(in: GridOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

const MODEL: &str = r#"
@group(1) @binding(0)
var albedo: texture_2d<f32>;
@group(1) @binding(1)
var albedo_sampler: sampler;

struct ModelVertex {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct ModelOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn vs_model(vertex: ModelVertex) -> ModelOutput {
    var out: ModelOutput;
    out.clip_position = uniforms.view_proj * vec4<f32>(vertex.position, 1.0);
    out.normal = vertex.normal;
    out.uv = vec2<f32>(vertex.uv.x, 1.0 - vertex.uv.y);
    return out;
}

@fragment
fn fs_model(in: ModelOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(vec3<f32>(0.3, 1.0, 0.5));
    let diffuse = max(dot(normalize(in.normal), light_dir), 0.0);
    let lighting = 0.3 + diffuse * 0.7;
    let color = textureSample(albedo, albedo_sampler, in.uv);
    return vec4<f32>(color.rgb * lighting, color.a);
}
"#;

const SKY: &str = r#"
@group(1) @binding(0)
var sky: texture_cube<f32>;
@group(1) @binding(1)
var sky_sampler: sampler;

struct SkyOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) direction: vec3<f32>,
};

// Fullscreen triangle at the far plane, unprojected into a view direction.
@vertex
fn vs_sky(@builtin(vertex_index) index: u32) -> SkyOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    let ndc = vec4<f32>(uv * 2.0 - 1.0, 1.0, 1.0);
    let world = uniforms.inv_sky_view_proj * ndc;
    var out: SkyOutput;
    out.clip_position = ndc;
    out.direction = world.xyz / world.w;
    return out;
}

@fragment
fn fs_sky(in: SkyOutput) -> @location(0) vec4<f32> {
    return textureSample(sky, sky_sampler, normalize(in.direction));
}
"#;

pub fn grid_shader() -> String {
    format!("{UNIFORMS}{GRID}")
}

pub fn model_shader() -> String {
    format!("{UNIFORMS}{MODEL}")
}

pub fn sky_shader() -> String {
    format!("{UNIFORMS}{SKY}")
}
