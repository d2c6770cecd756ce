use std::sync::mpsc;

use image::RgbaImage;

use crate::error::EncodeFailure;

const BYTES_PER_PIXEL: u32 = 4;

/// A colour texture that frames can be rendered into instead of a surface.
pub(crate) struct OffscreenTarget {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
}

impl OffscreenTarget {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, size: (u32, u32)) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen target"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    /// Copies the texture into host memory as tightly packed RGBA rows.
    pub fn read_rgba(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        mut encoder: wgpu::CommandEncoder,
    ) -> Result<RgbaImage, EncodeFailure> {
        let order = channel_order(self.texture.format())?;
        let (width, height) = self.size;
        let unpadded_bytes_per_row = width * BYTES_PER_PIXEL;
        let padded_bytes_per_row =
            unpadded_bytes_per_row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| EncodeFailure::Readback(err.to_string()))?;
        receiver
            .recv()
            .map_err(|_| EncodeFailure::Readback("map callback never fired".to_string()))?
            .map_err(|err| EncodeFailure::Readback(err.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = tight_rows(
            &mapped,
            unpadded_bytes_per_row as usize,
            padded_bytes_per_row as usize,
            height as usize,
        );
        drop(mapped);
        buffer.unmap();

        if order == ChannelOrder::Bgra {
            swizzle_bgra(&mut pixels);
        }

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| EncodeFailure::Readback("readback size mismatch".to_string()))
    }
}

fn tight_rows(padded: &[u8], unpadded: usize, stride: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(unpadded * height);
    for row in padded.chunks(stride).take(height) {
        pixels.extend_from_slice(&row[..unpadded.min(row.len())]);
    }
    pixels
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelOrder {
    Rgba,
    Bgra,
}

/// Only 8-bit four channel formats map onto [`RgbaImage`] byte for byte.
fn channel_order(format: wgpu::TextureFormat) -> Result<ChannelOrder, EncodeFailure> {
    use wgpu::TextureFormat::*;
    match format {
        Rgba8Unorm | Rgba8UnormSrgb => Ok(ChannelOrder::Rgba),
        Bgra8Unorm | Bgra8UnormSrgb => Ok(ChannelOrder::Bgra),
        other => Err(EncodeFailure::Readback(format!(
            "cannot read back {other:?} as 8-bit RGBA"
        ))),
    }
}

fn swizzle_bgra(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
}
