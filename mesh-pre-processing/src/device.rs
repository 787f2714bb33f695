/// GPU resource management: device discovery, exclusive sessions and
/// session-scoped buffers.
use crate::error::{Error, Result};
use bytemuck::Pod;
use parking_lot::{Mutex, MutexGuard};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use wgpu::util::DeviceExt;

/// Shared GPU context containing the device and queue.
///
/// Sessions opened on one context are serialised: [`GpuContext::session`]
/// blocks until the previous session has been dropped.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    session_lock: Mutex<()>,
    lost: Arc<AtomicBool>,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.info.name)
            .field("backend", &self.info.backend)
            .finish()
    }
}

impl GpuContext {
    /// Select the best available adapter with compute support.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| Error::DeviceUnavailable("no GPU adapter found".to_string()))?;

        let info = adapter.get_info();
        if !adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(Error::DeviceUnavailable(format!(
                "{} does not support compute shaders",
                info.name
            )));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Surface Sampling Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|err| Error::DeviceUnavailable(format!("{}: {err}", info.name)))?;

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);
        let adapter_name = info.name.clone();
        device.set_device_lost_callback(move |reason, message| {
            lost_flag.store(true, Ordering::Release);
            log::error!("GPU device {adapter_name} lost ({reason:?}): {message}");
        });

        log::info!("Using GPU adapter {} ({:?})", info.name, info.backend);
        Ok(Self {
            device,
            queue,
            info,
            session_lock: Mutex::new(()),
            lost,
        })
    }

    /// Capability query: a shareable context if a compatible device exists now.
    pub fn probe() -> Option<Arc<Self>> {
        match Self::new() {
            Ok(context) => Some(Arc::new(context)),
            Err(err) => {
                log::debug!("GPU probe failed: {err}");
                None
            }
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.info.name
    }

    /// False once the driver has reported the device lost.
    pub fn is_available(&self) -> bool {
        !self.lost.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }

    /// Largest buffer that can be bound as one storage binding.
    pub fn max_storage_binding_bytes(&self) -> u64 {
        let limits = self.device.limits();
        u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Open the exclusive session for this device.
    pub fn session(&self) -> DeviceSession<'_> {
        let exclusive = self.session_lock.lock();
        log::debug!("GPU session opened on {}", self.info.name);
        DeviceSession {
            context: self,
            _exclusive: exclusive,
            allocated_bytes: Cell::new(0),
        }
    }
}

/// Exclusive, scoped claim on a [`GpuContext`].
///
/// Every buffer allocated through the session borrows it, so all of them are
/// destroyed before the session itself is dropped. Dropping the session waits
/// for outstanding device work and releases the exclusive lock, on success
/// and on error unwinding alike.
pub struct DeviceSession<'a> {
    context: &'a GpuContext,
    _exclusive: MutexGuard<'a, ()>,
    allocated_bytes: Cell<u64>,
}

impl<'a> DeviceSession<'a> {
    pub fn context(&self) -> &'a GpuContext {
        self.context
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.get()
    }

    /// Copy host data into a new device buffer.
    pub fn upload<T: Pod>(
        &self,
        label: &str,
        contents: &[T],
        usage: wgpu::BufferUsages,
    ) -> Result<DeviceBuffer<'_>> {
        let size = std::mem::size_of_val(contents) as u64;
        self.check_limits(label, size, usage)?;
        self.tracked(label, size, contents.len(), || {
            self.context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(contents),
                    usage,
                })
        })
    }

    /// Uninitialised device buffer holding `len` elements of `T`.
    pub fn allocate<T: Pod>(
        &self,
        label: &str,
        len: usize,
        usage: wgpu::BufferUsages,
    ) -> Result<DeviceBuffer<'_>> {
        // Zero-sized bindings are invalid, keep at least one element.
        let size = (len.max(1) * std::mem::size_of::<T>()) as u64;
        self.check_limits(label, size, usage)?;
        self.tracked(label, size, len, || {
            self.context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        })
    }

    /// Host-readable buffer for `len` elements of `T`.
    pub fn staging<T: Pod>(&self, label: &str, len: usize) -> Result<DeviceBuffer<'_>> {
        self.allocate::<T>(
            label,
            len,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        )
    }

    pub fn command_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submit recorded work, surfacing validation errors.
    pub fn submit(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.context.queue.submit(Some(encoder.finish()));
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(Error::DeviceError(err.to_string())),
            None => Ok(()),
        }
    }

    /// Map a staging buffer and copy its contents to the host.
    /// Blocks until the device has finished all submitted work.
    pub fn read<T: Pod>(&self, staging: &DeviceBuffer<'_>) -> Result<Vec<T>> {
        let slice = staging.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            tx.send(res).ok();
        });
        let _ = self.context.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| Error::DeviceError("readback channel closed".to_string()))?
            .map_err(|err| Error::DeviceError(format!("buffer mapping failed: {err}")))?;

        let data = slice.get_mapped_range();
        let mut values: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.buffer.unmap();

        values.truncate(staging.len);
        Ok(values)
    }

    fn check_limits(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> Result<()> {
        let limits = self.context.device.limits();
        let storage_limit = u64::from(limits.max_storage_buffer_binding_size);
        if size > limits.max_buffer_size
            || (usage.contains(wgpu::BufferUsages::STORAGE) && size > storage_limit)
        {
            return Err(Error::AllocationFailure(format!(
                "{label}: {size} bytes exceeds device limits (buffer {}, storage binding {storage_limit})",
                limits.max_buffer_size
            )));
        }
        Ok(())
    }

    fn tracked<F>(&self, label: &str, size: u64, len: usize, create: F) -> Result<DeviceBuffer<'_>>
    where
        F: FnOnce() -> wgpu::Buffer,
    {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = create();
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            buffer.destroy();
            return Err(Error::AllocationFailure(format!("{label}: {err}")));
        }

        self.allocated_bytes.set(self.allocated_bytes.get() + size);
        Ok(DeviceBuffer {
            buffer,
            len,
            _session: PhantomData,
        })
    }
}

impl Drop for DeviceSession<'_> {
    fn drop(&mut self) {
        let _ = self.context.device.poll(wgpu::Maintain::Wait);
        log::debug!(
            "GPU session on {} released ({} bytes allocated)",
            self.context.info.name,
            self.allocated_bytes.get()
        );
    }
}

/// Device memory owned by a [`DeviceSession`]. Destroyed on drop.
pub struct DeviceBuffer<'s> {
    buffer: wgpu::Buffer,
    len: usize,
    _session: PhantomData<&'s ()>,
}

impl DeviceBuffer<'_> {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Number of elements the buffer was created for.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

impl Drop for DeviceBuffer<'_> {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}
