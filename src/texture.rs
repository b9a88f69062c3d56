use image::{Rgba, RgbaImage};

/// A sampled RGBA8 sRGB texture, used for the environment map.
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &RgbaImage,
        label: Option<&str>,
    ) -> Self {
        let (width, height) = img.dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            img.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        // Longitude wraps, latitude clamps.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label,
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }
}

/// Equirectangular sky used when no environment map is configured: a
/// horizon-to-zenith blue gradient over a grey ground band.
pub fn sky_gradient(width: u32, height: u32) -> RgbaImage {
    let zenith = glam::Vec3::new(0.18, 0.38, 0.78);
    let horizon = glam::Vec3::new(0.85, 0.9, 0.97);
    let ground = glam::Vec3::new(0.32, 0.3, 0.28);

    RgbaImage::from_fn(width, height, |_, y| {
        // Row 0 is straight up, the last row straight down.
        let v = y as f32 / (height.max(2) - 1) as f32;
        let color = if v < 0.5 {
            horizon.lerp(zenith, (1.0 - v * 2.0).powf(0.6))
        } else {
            ground
        };
        Rgba(convert_rgba(color.extend(1.0)))
    })
}

fn convert_rgba(color: glam::Vec4) -> [u8; 4] {
    let color = color.clamp(glam::Vec4::ZERO, glam::Vec4::ONE) * 255.0;
    [color.x as u8, color.y as u8, color.z as u8, color.w as u8]
}
