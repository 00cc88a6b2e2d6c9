use std::collections::HashMap;

use wgpu::ShaderModuleDescriptor;
use wesl::{ModulePath, VirtualResolver, Wesl};

// Embed shader sources at compile time
const SHADER_CAMERA: &str = include_str!("shaders/camera.wesl");
const SHADER_LIGHTING: &str = include_str!("shaders/lighting.wesl");
const SHADER_HIGHLIGHT: &str = include_str!("shaders/highlight.wesl");
const SHADER_MAIN: &str = include_str!("shaders/main.wesl");
const SHADER_DECAL: &str = include_str!("shaders/decal.wesl");
const SHADER_OCCLUSION: &str = include_str!("shaders/occlusion.wesl");

/// The shader variants the renderer asks for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ShaderKind {
    /// Mesh material. `region_highlight` is the defect-region decoration.
    Material { has_texture: bool, region_highlight: bool },
    Decal,
    /// Depth-only point probe for occlusion queries.
    Occlusion,
}

impl ShaderKind {
    fn root(&self) -> &'static str {
        match self {
            ShaderKind::Material { .. } => "package::main",
            ShaderKind::Decal => "package::decal",
            ShaderKind::Occlusion => "package::occlusion",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ShaderKind::Material { has_texture: true, region_highlight: true } => "Highlighted Texture Material Shader",
            ShaderKind::Material { has_texture: true, region_highlight: false } => "Texture Material Shader",
            ShaderKind::Material { has_texture: false, region_highlight: true } => "Highlighted Color Material Shader",
            ShaderKind::Material { has_texture: false, region_highlight: false } => "Color Material Shader",
            ShaderKind::Decal => "Decal Shader",
            ShaderKind::Occlusion => "Occlusion Probe Shader",
        }
    }

    fn features(&self) -> [(&'static str, bool); 2] {
        match *self {
            ShaderKind::Material { has_texture, region_highlight } => {
                [("has_texture", has_texture), ("region_highlight", region_highlight)]
            }
            _ => [("has_texture", false), ("region_highlight", false)],
        }
    }
}

/// Shader generator using the WESL compiler to assemble modular shaders
pub(crate) struct ShaderGenerator {
    /// WESL compiler instance with embedded shader sources
    compiler: Wesl<VirtualResolver<'static>>,
    module_cache: HashMap<ShaderKind, wgpu::ShaderModule>,
}

impl ShaderGenerator {
    pub fn new() -> anyhow::Result<Self> {
        let mut resolver = VirtualResolver::default();

        resolver.add_module("package::camera".parse()?, SHADER_CAMERA.into());
        resolver.add_module("package::lighting".parse()?, SHADER_LIGHTING.into());
        resolver.add_module("package::highlight".parse()?, SHADER_HIGHLIGHT.into());
        resolver.add_module("package::main".parse()?, SHADER_MAIN.into());
        resolver.add_module("package::decal".parse()?, SHADER_DECAL.into());
        resolver.add_module("package::occlusion".parse()?, SHADER_OCCLUSION.into());

        let compiler = Wesl::new(".").set_custom_resolver(resolver);

        Ok(Self {
            compiler,
            module_cache: HashMap::new(),
        })
    }

    /// Compiles a variant to WGSL without touching the GPU.
    pub fn compile_wgsl(&mut self, kind: ShaderKind) -> anyhow::Result<String> {
        let path: ModulePath = kind.root().parse()?;
        self.compiler.set_features(kind.features());
        let result = self.compiler.compile(&path)?;
        Ok(result.to_string())
    }

    /// Returns the cached module for `kind`, compiling it on first use.
    pub fn generate_shader(&mut self, device: &wgpu::Device, kind: ShaderKind) -> anyhow::Result<wgpu::ShaderModule> {
        if let Some(cached) = self.module_cache.get(&kind) {
            return Ok(cached.clone());
        }

        let wgsl = self.compile_wgsl(kind)?;
        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some(kind.label()),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });

        self.module_cache.insert(kind, module.clone());
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(has_texture: bool, region_highlight: bool) -> ShaderKind {
        ShaderKind::Material { has_texture, region_highlight }
    }

    #[test]
    fn test_all_variants_compile() {
        let mut generator = ShaderGenerator::new().unwrap();
        for kind in [
            material(false, false),
            material(false, true),
            material(true, false),
            material(true, true),
            ShaderKind::Decal,
            ShaderKind::Occlusion,
        ] {
            let wgsl = generator.compile_wgsl(kind).unwrap();
            assert!(wgsl.contains("vs_main"), "{kind:?} has no vertex entry point");
        }
    }

    #[test]
    fn test_highlight_feature_changes_output() {
        let mut generator = ShaderGenerator::new().unwrap();
        let plain = generator.compile_wgsl(material(false, false)).unwrap();
        let decorated = generator.compile_wgsl(material(false, true)).unwrap();
        assert_ne!(plain, decorated);
        assert!(decorated.contains("fs_main"));
    }

    #[test]
    fn test_occlusion_probe_has_no_fragment_stage() {
        let mut generator = ShaderGenerator::new().unwrap();
        let wgsl = generator.compile_wgsl(ShaderKind::Occlusion).unwrap();
        assert!(!wgsl.contains("@fragment"));
    }
}
