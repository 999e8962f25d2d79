use crate::backend::{GpuBackend, TextureDesc, TextureKind, TextureWrite};
use crate::context::GpuContext;
use crate::error::GpuError;
use crate::resource::TextureId;
use glam::Vec3;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("cube face {face:?} is {width}x{height}, expected {expected}x{expected}")]
    FaceMismatch {
        face: CubeFace,
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Canceled(#[from] kiln_common::Canceled),
}

/// Where image pixels come from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    /// PNG or JPEG bytes.
    Encoded(Arc<[u8]>),
    Decoded(RgbaImage),
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<RgbaImage> for ImageSource {
    fn from(image: RgbaImage) -> Self {
        Self::Decoded(image)
    }
}

impl ImageSource {
    fn decode(self) -> Result<RgbaImage, TextureError> {
        match self {
            Self::Path(path) => {
                let bytes = std::fs::read(&path).map_err(|source| TextureError::Io { path, source })?;
                Ok(image::load_from_memory(&bytes)?.to_rgba8())
            }
            Self::Encoded(bytes) => Ok(image::load_from_memory(&bytes)?.to_rgba8()),
            Self::Decoded(image) => Ok(image),
        }
    }

    /// Decode on a worker thread.
    async fn decode_off_thread(self) -> Result<RgbaImage, TextureError> {
        kiln_common::unblock(move || self.decode()).await?
    }
}

/// Cube faces in layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    pub fn layer(self) -> u32 {
        self as u32
    }

    /// Conventional file stem, e.g. `posx`.
    pub fn stem(self) -> &'static str {
        match self {
            Self::PosX => "posx",
            Self::NegX => "negx",
            Self::PosY => "posy",
            Self::NegY => "negy",
            Self::PosZ => "posz",
            Self::NegZ => "negz",
        }
    }

    /// View direction of a camera rendering this face.
    pub fn direction(self) -> Vec3 {
        match self {
            Self::PosX => Vec3::X,
            Self::NegX => Vec3::NEG_X,
            Self::PosY => Vec3::Y,
            Self::NegY => Vec3::NEG_Y,
            Self::PosZ => Vec3::Z,
            Self::NegZ => Vec3::NEG_Z,
        }
    }

    /// Up vector of a camera rendering this face, matching the cube-map
    /// sampling convention.
    pub fn up(self) -> Vec3 {
        match self {
            Self::PosY => Vec3::Z,
            Self::NegY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }
}

/// The six images of a cube texture.
#[derive(Debug, Clone)]
pub struct CubeSources {
    pub posx: ImageSource,
    pub negx: ImageSource,
    pub posy: ImageSource,
    pub negy: ImageSource,
    pub posz: ImageSource,
    pub negz: ImageSource,
}

impl CubeSources {
    /// `posx.<ext>` … `negz.<ext>` inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>, extension: &str) -> Self {
        let dir = dir.as_ref();
        let face = |f: CubeFace| ImageSource::Path(dir.join(format!("{}.{extension}", f.stem())));
        Self {
            posx: face(CubeFace::PosX),
            negx: face(CubeFace::NegX),
            posy: face(CubeFace::PosY),
            negy: face(CubeFace::NegY),
            posz: face(CubeFace::PosZ),
            negz: face(CubeFace::NegZ),
        }
    }

    fn into_layers(self) -> [ImageSource; 6] {
        [self.posx, self.negx, self.posy, self.negy, self.posz, self.negz]
    }
}

/// Handle to an uploaded texture. No pixel data is kept on the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub id: TextureId,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
}

impl Texture {
    /// Decode an image and upload it as a 2D texture with a full mip chain.
    pub async fn load_plane<B: GpuBackend>(
        ctx: &mut GpuContext<B>,
        source: impl Into<ImageSource>,
    ) -> Result<Self, TextureError> {
        let image = source.into().decode_off_thread().await?;
        let (width, height) = image.dimensions();
        let texture = Self::allocate(ctx, TextureKind::Plane, width, height, mip_count(width, height))?;
        texture.upload_with_mips(ctx, 0, image)?;
        tracing::debug!(id = %texture.id, width, height, "plane texture loaded");
        Ok(texture)
    }

    /// Decode six faces concurrently and upload them as one cube texture.
    pub async fn load_cube<B: GpuBackend>(
        ctx: &mut GpuContext<B>,
        sources: CubeSources,
    ) -> Result<Self, TextureError> {
        let faces = futures::future::try_join_all(
            sources.into_layers().into_iter().map(ImageSource::decode_off_thread),
        )
        .await?;

        let size = faces[0].width();
        for (face, image) in CubeFace::ALL.into_iter().zip(&faces) {
            let (width, height) = image.dimensions();
            if width != size || height != size {
                return Err(TextureError::FaceMismatch {
                    face,
                    width,
                    height,
                    expected: size,
                });
            }
        }

        let texture = Self::allocate(ctx, TextureKind::Cube, size, size, mip_count(size, size))?;
        for (face, image) in CubeFace::ALL.into_iter().zip(faces) {
            texture.upload_with_mips(ctx, face.layer(), image)?;
        }
        tracing::debug!(id = %texture.id, size, "cube texture loaded");
        Ok(texture)
    }

    /// Empty single-level cube texture to render into.
    pub fn render_target_cube<B: GpuBackend>(ctx: &mut GpuContext<B>, size: u32) -> Result<Self, GpuError> {
        Self::allocate(ctx, TextureKind::Cube, size, size, 1)
    }

    fn allocate<B: GpuBackend>(
        ctx: &mut GpuContext<B>,
        kind: TextureKind,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) -> Result<Self, GpuError> {
        let id = ctx.create_texture(TextureDesc {
            kind,
            width,
            height,
            mip_levels,
        })?;
        Ok(Self {
            id,
            kind,
            width,
            height,
            mip_levels,
        })
    }

    fn upload_with_mips<B: GpuBackend>(
        &self,
        ctx: &mut GpuContext<B>,
        layer: u32,
        base: RgbaImage,
    ) -> Result<(), GpuError> {
        let mut level = base;
        for mip in 0..self.mip_levels {
            if mip > 0 {
                let width = (self.width >> mip).max(1);
                let height = (self.height >> mip).max(1);
                level = imageops::resize(&level, width, height, FilterType::Triangle);
            }
            ctx.write_texture(
                self.id,
                &TextureWrite {
                    layer,
                    mip,
                    width: level.width(),
                    height: level.height(),
                    rgba: level.as_raw(),
                },
            )?;
        }
        Ok(())
    }

    /// Select the texture unit subsequent binds apply to.
    pub fn activate<B: GpuBackend>(&self, ctx: &mut GpuContext<B>, unit: u32) -> Result<(), GpuError> {
        ctx.active_texture(unit)
    }

    /// Bind to this texture's target on the active unit.
    pub fn bind<B: GpuBackend>(&self, ctx: &mut GpuContext<B>) -> Result<(), GpuError> {
        ctx.bind_texture(self.kind, Some(self.id))
    }
}

/// Levels in a full chain down to 1x1.
pub fn mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GpuCommand, HeadlessBackend};
    use image::Rgba;

    fn ctx() -> GpuContext<HeadlessBackend> {
        GpuContext::new(HeadlessBackend::new(64, 64))
    }

    fn solid(size: u32) -> ImageSource {
        ImageSource::Decoded(RgbaImage::from_pixel(size, size, Rgba([255, 0, 0, 255])))
    }

    fn solid_cube(size: u32) -> CubeSources {
        CubeSources {
            posx: solid(size),
            negx: solid(size),
            posy: solid(size),
            negy: solid(size),
            posz: solid(size),
            negz: solid(size),
        }
    }

    #[test]
    fn mip_counts() {
        assert_eq!(mip_count(1, 1), 1);
        assert_eq!(mip_count(512, 512), 10);
        assert_eq!(mip_count(300, 20), 9);
    }

    #[test]
    fn plane_uploads_every_level() {
        let mut ctx = ctx();
        let tex = pollster::block_on(Texture::load_plane(&mut ctx, solid(8))).unwrap();
        assert_eq!(tex.kind, TextureKind::Plane);
        assert_eq!(tex.mip_levels, 4);
        let writes = ctx
            .backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::WriteTexture { .. }))
            .count();
        assert_eq!(writes, 4);
    }

    #[test]
    fn cube_faces_in_layer_order() {
        let mut ctx = ctx();
        let tex = pollster::block_on(Texture::load_cube(&mut ctx, solid_cube(4))).unwrap();
        assert_eq!(tex.kind, TextureKind::Cube);
        let base_layers: Vec<u32> = ctx
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::WriteTexture { layer, mip: 0, .. } => Some(*layer),
                _ => None,
            })
            .collect();
        assert_eq!(base_layers, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn unequal_faces_rejected() {
        let mut ctx = ctx();
        let mut sources = solid_cube(4);
        sources.negy = solid(8);
        let err = pollster::block_on(Texture::load_cube(&mut ctx, sources)).unwrap_err();
        assert!(matches!(
            err,
            TextureError::FaceMismatch {
                face: CubeFace::NegY,
                ..
            }
        ));
        assert!(ctx.live_resources().is_empty());
    }

    #[test]
    fn loads_from_encoded_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("px.png");
        RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255]))
            .save(&path)
            .unwrap();
        let mut ctx = ctx();
        let tex = pollster::block_on(Texture::load_plane(&mut ctx, path.as_path())).unwrap();
        assert_eq!((tex.width, tex.height), (2, 2));

        let missing = pollster::block_on(Texture::load_plane(&mut ctx, dir.path().join("none.png")));
        assert!(matches!(missing, Err(TextureError::Io { .. })));

        let garbage = ImageSource::Encoded(Arc::from(&b"not an image"[..]));
        let bad = pollster::block_on(Texture::load_plane(&mut ctx, garbage));
        assert!(matches!(bad, Err(TextureError::Decode(_))));
    }

    #[test]
    fn activate_then_bind() {
        let mut ctx = ctx();
        let tex = Texture::render_target_cube(&mut ctx, 16).unwrap();
        tex.activate(&mut ctx, 1).unwrap();
        tex.bind(&mut ctx).unwrap();
        assert_eq!(ctx.bind_state().units[1].cube, Some(tex.id));
    }

    #[test]
    fn face_orientation_table() {
        assert_eq!(CubeFace::PosY.up(), Vec3::Z);
        assert_eq!(CubeFace::NegY.up(), Vec3::NEG_Z);
        assert_eq!(CubeFace::NegZ.up(), Vec3::NEG_Y);
        assert_eq!(CubeFace::NegX.direction(), Vec3::NEG_X);
    }
}
