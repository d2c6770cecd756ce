use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::types::{EngineConfig, GpuPowerPreference, VsyncMode};

/// Surface formats shader output lands in unchanged and that capture can
/// read back, in order of preference.
const READABLE_FORMATS: [wgpu::TextureFormat; 2] = [
    wgpu::TextureFormat::Bgra8Unorm,
    wgpu::TextureFormat::Rgba8Unorm,
];

/// Where finished frames go.
pub(crate) enum Presentation {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    /// No surface; frames render into an offscreen texture.
    Headless,
}

/// Instance, device and (optionally) the presentation surface.
pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub presentation: Presentation,
    pub format: wgpu::TextureFormat,
    pub size: (u32, u32),
    pub adapter_name: String,
    max_dimension: u32,
}

impl GpuContext {
    pub(crate) fn windowed<T>(target: &T, config: &EngineConfig) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = create_instance();

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        // The host keeps the window alive for longer than the backend.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let adapter = request_adapter(&instance, config.power, Some(&surface))?;
        let (device, queue) = request_device(&adapter)?;
        let max_dimension = adapter.limits().max_texture_dimension_2d;

        let caps = surface.get_capabilities(&adapter);
        let format = select_surface_format(&caps.formats)
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        if !READABLE_FORMATS.contains(&format) {
            tracing::warn!(
                ?format,
                "no 8-bit linear surface format available; colours may differ and screenshots will fail"
            );
        }

        let present_mode = select_present_mode(&caps.present_modes, config.vsync);
        tracing::debug!(?present_mode, vsync = ?config.vsync, "using present mode");

        let size = clamp_size(config.surface_size, max_dimension);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.0,
            height: size.1,
            present_mode,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        Ok(Self {
            _instance: instance,
            device,
            queue,
            presentation: Presentation::Window {
                surface,
                config: surface_config,
            },
            format,
            size,
            adapter_name: adapter.get_info().name,
            max_dimension,
        })
    }

    pub(crate) fn headless(config: &EngineConfig) -> Result<Self> {
        let instance = create_instance();
        let adapter = request_adapter(&instance, config.power, None)?;
        let (device, queue) = request_device(&adapter)?;
        let max_dimension = adapter.limits().max_texture_dimension_2d;

        Ok(Self {
            _instance: instance,
            device,
            queue,
            presentation: Presentation::Headless,
            format: wgpu::TextureFormat::Rgba8Unorm,
            size: clamp_size(config.surface_size, max_dimension),
            adapter_name: adapter.get_info().name,
            max_dimension,
        })
    }

    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        let size = clamp_size((width, height), self.max_dimension);
        if size != (width.max(1), height.max(1)) {
            tracing::warn!(
                width,
                height,
                max = self.max_dimension,
                "requested size exceeds GPU limits; clamping"
            );
        }
        self.size = size;
        self.reconfigure();
    }

    /// Reapplies the surface configuration, e.g. after the surface was lost.
    pub(crate) fn reconfigure(&mut self) {
        if let Presentation::Window { surface, config } = &mut self.presentation {
            config.width = self.size.0;
            config.height = self.size.1;
            surface.configure(&self.device, config);
        }
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_adapter(
    instance: &wgpu::Instance,
    power: GpuPowerPreference,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<wgpu::Adapter> {
    let power_preference = match power {
        GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
        GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
    };
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference,
        compatible_surface: surface,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")?;

    let info = adapter.get_info();
    tracing::debug!(
        name = %info.name,
        backend = ?info.backend,
        device_type = ?info.device_type,
        "selected GPU adapter"
    );
    Ok(adapter)
}

fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("shaderlab device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .context("failed to create GPU device")?;

    // Errors outside an explicit scope would otherwise panic.
    device.on_uncaptured_error(Box::new(|error| {
        tracing::error!(%error, "uncaptured GPU error");
    }));
    Ok((device, queue))
}

fn select_present_mode(modes: &[wgpu::PresentMode], vsync: VsyncMode) -> wgpu::PresentMode {
    let find = |wanted: wgpu::PresentMode| modes.iter().copied().find(|mode| *mode == wanted);
    match vsync {
        VsyncMode::On => wgpu::PresentMode::Fifo,
        VsyncMode::Off => find(wgpu::PresentMode::Immediate)
            .or_else(|| find(wgpu::PresentMode::Mailbox))
            .unwrap_or(wgpu::PresentMode::Fifo),
    }
}

/// WebGL canvases are not colour managed, so an 8-bit linear format wins.
/// Anything else the surface offers is a last resort.
fn select_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    READABLE_FORMATS
        .iter()
        .copied()
        .find(|wanted| formats.contains(wanted))
        .or_else(|| formats.iter().copied().find(|format| !format.is_srgb()))
        .or_else(|| formats.first().copied())
}

fn clamp_size((width, height): (u32, u32), max_dimension: u32) -> (u32, u32) {
    (
        width.clamp(1, max_dimension.max(1)),
        height.clamp(1, max_dimension.max(1)),
    )
}
