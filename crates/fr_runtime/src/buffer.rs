// crates/fr_runtime/src/buffer.rs

//! 设备缓冲区
//!
//! 每个缓冲区将一块主机后备内存与一块设备分配配对。写入（主机→设备）
//! 与读回（设备→暂存）都是入队操作，按提交顺序完成；读回内容在
//! 队列排空后通过 [`RawDeviceBuffer::resolve_read`] 解析回主机块。
//!
//! 精度选择：同一分配只存在一种元素宽度视图，由 [`ScalarBuffer`]
//! 按精度标签在边界处转换，主机侧统一以 f64 交互。

use crate::context::GpuDevice;
use fr_foundation::{FrError, FrResult, Precision, RuntimeScalar};
use std::sync::mpsc;
use std::sync::Arc;
use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device};

fn store_scalars<S: RuntimeScalar>(host: &mut [u8], values: &[f64]) {
    let host: &mut [S] = bytemuck::cast_slice_mut(host);
    for (dst, &v) in host.iter_mut().zip(values) {
        *dst = S::from_config(v);
    }
}

fn load_scalars<S: RuntimeScalar>(host: &[u8]) -> Vec<f64> {
    bytemuck::cast_slice::<u8, S>(host)
        .iter()
        .map(|v| v.to_config())
        .collect()
}

/// 缓冲区用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// 存储缓冲区（核函数可读写）
    Storage,
    /// 只读存储
    StorageReadOnly,
    /// 统一缓冲区（小型常量数据）
    Uniform,
}

impl BufferKind {
    fn to_wgpu_usage(self) -> BufferUsages {
        match self {
            Self::Storage => {
                BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC
            }
            Self::StorageReadOnly => BufferUsages::STORAGE | BufferUsages::COPY_DST,
            Self::Uniform => BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        }
    }
}

/// 原始设备缓冲区
pub struct RawDeviceBuffer {
    label: String,
    size_bytes: u64,
    buffer: Buffer,
    staging: Option<Buffer>,
    host: Vec<u8>,
    device: Arc<Device>,
}

impl RawDeviceBuffer {
    /// 创建缓冲区
    ///
    /// `readback` 为 true 时附带一块等大的暂存缓冲区用于设备→主机拷贝。
    /// 分配失败返回 [`FrError::OutOfMemory`]。
    pub fn new(
        gpu: &GpuDevice,
        label: impl Into<String>,
        size_bytes: u64,
        kind: BufferKind,
        readback: bool,
    ) -> FrResult<Self> {
        let label = label.into();
        let caps = gpu.capabilities();
        if size_bytes > caps.memory.max_buffer_size
            || (kind != BufferKind::Uniform && size_bytes > caps.memory.max_storage_binding_size)
        {
            return Err(FrError::out_of_memory(label, size_bytes));
        }

        let device = gpu.raw_device().clone();
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(&label),
            size: size_bytes.max(4),
            usage: kind.to_wgpu_usage(),
            mapped_at_creation: false,
        });
        let staging = readback.then(|| {
            device.create_buffer(&BufferDescriptor {
                label: Some(&format!("{label}_staging")),
                size: size_bytes.max(4),
                usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        if pollster::block_on(device.pop_error_scope()).is_some() {
            return Err(FrError::out_of_memory(label, size_bytes));
        }

        Ok(Self {
            label,
            size_bytes,
            buffer,
            staging,
            host: vec![0u8; size_bytes as usize],
            device,
        })
    }

    /// 缓冲区标签
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 字节大小
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// 主机后备块
    pub fn host_bytes(&self) -> &[u8] {
        &self.host
    }

    /// 主机后备块（可写）
    pub fn host_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.host
    }

    /// 底层设备缓冲区
    pub(crate) fn raw(&self) -> &Buffer {
        &self.buffer
    }

    /// 暂存缓冲区
    pub(crate) fn staging(&self) -> Option<&Buffer> {
        self.staging.as_ref()
    }

    /// 绑定资源
    pub fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    /// 队列排空后将暂存内容解析回主机块
    ///
    /// 必须在 `block_until_finished` 之后调用。
    pub fn resolve_read(&mut self) -> FrResult<()> {
        let len = self.size_bytes;
        self.resolve_read_range(0, len)
    }

    /// 解析暂存缓冲区中的一个区间回主机块
    pub fn resolve_read_range(&mut self, offset_bytes: u64, len_bytes: u64) -> FrResult<()> {
        if offset_bytes + len_bytes > self.size_bytes {
            return Err(FrError::invalid_input(format!(
                "resolve range exceeds buffer '{}' capacity",
                self.label
            )));
        }
        let staging = self.staging.as_ref().ok_or_else(|| {
            FrError::invalid_state(format!("buffer '{}' was not created readable", self.label))
        })?;

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| FrError::internal(e.to_string()))?
            .map_err(|e| FrError::internal(format!("map failed on '{}': {e:?}", self.label)))?;

        {
            let data = slice.get_mapped_range();
            let start = offset_bytes as usize;
            let end = (offset_bytes + len_bytes) as usize;
            self.host[start..end].copy_from_slice(&data[start..end]);
        }
        staging.unmap();
        Ok(())
    }
}

/// 标量缓冲区
///
/// 元素宽度由精度标签决定；主机侧以 f64 写入/读取。
pub struct ScalarBuffer {
    raw: RawDeviceBuffer,
    precision: Precision,
    len: usize,
}

impl ScalarBuffer {
    /// 创建长度为 `len` 的标量缓冲区
    pub fn new(
        gpu: &GpuDevice,
        label: impl Into<String>,
        len: usize,
        precision: Precision,
        kind: BufferKind,
        readback: bool,
    ) -> FrResult<Self> {
        let size = (len * precision.size_bytes()) as u64;
        Ok(Self {
            raw: RawDeviceBuffer::new(gpu, label, size, kind, readback)?,
            precision,
            len,
        })
    }

    /// 元素数量
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 精度标签
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// 原始缓冲区
    pub fn raw(&self) -> &RawDeviceBuffer {
        &self.raw
    }

    /// 原始缓冲区（可写）
    pub fn raw_mut(&mut self) -> &mut RawDeviceBuffer {
        &mut self.raw
    }

    /// 将 f64 切片转换写入主机块
    pub fn store_f64(&mut self, values: &[f64]) -> FrResult<()> {
        if values.len() != self.len {
            return Err(FrError::invalid_input(format!(
                "buffer '{}' expects {} scalars, got {}",
                self.raw.label, self.len, values.len()
            )));
        }
        match self.precision {
            Precision::Single => store_scalars::<f32>(self.raw.host_bytes_mut(), values),
            Precision::Double => store_scalars::<f64>(self.raw.host_bytes_mut(), values),
        }
        Ok(())
    }

    /// 写入单个标量到主机块
    pub fn store_f64_at(&mut self, index: usize, value: f64) -> FrResult<()> {
        FrError::check_index("Scalar", index, self.len)?;
        match self.precision {
            Precision::Single => {
                let host: &mut [f32] = bytemuck::cast_slice_mut(self.raw.host_bytes_mut());
                host[index] = value as f32;
            }
            Precision::Double => {
                let host: &mut [f64] = bytemuck::cast_slice_mut(self.raw.host_bytes_mut());
                host[index] = value;
            }
        }
        Ok(())
    }

    /// 读取主机块中的单个标量
    pub fn load_f64_at(&self, index: usize) -> FrResult<f64> {
        FrError::check_index("Scalar", index, self.len)?;
        Ok(match self.precision {
            Precision::Single => {
                let host: &[f32] = bytemuck::cast_slice(self.raw.host_bytes());
                host[index] as f64
            }
            Precision::Double => {
                let host: &[f64] = bytemuck::cast_slice(self.raw.host_bytes());
                host[index]
            }
        })
    }

    /// 主机块内容转换为 f64 向量
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self.precision {
            Precision::Single => load_scalars::<f32>(self.raw.host_bytes()),
            Precision::Double => load_scalars::<f64>(self.raw.host_bytes()),
        }
    }
}

/// u32 缓冲区（计数器、ID 表、标志位）
pub struct U32Buffer {
    raw: RawDeviceBuffer,
    len: usize,
}

impl U32Buffer {
    /// 创建长度为 `len` 的 u32 缓冲区
    pub fn new(
        gpu: &GpuDevice,
        label: impl Into<String>,
        len: usize,
        kind: BufferKind,
        readback: bool,
    ) -> FrResult<Self> {
        let size = (len * std::mem::size_of::<u32>()) as u64;
        Ok(Self {
            raw: RawDeviceBuffer::new(gpu, label, size, kind, readback)?,
            len,
        })
    }

    /// 元素数量
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 原始缓冲区
    pub fn raw(&self) -> &RawDeviceBuffer {
        &self.raw
    }

    /// 原始缓冲区（可写）
    pub fn raw_mut(&mut self) -> &mut RawDeviceBuffer {
        &mut self.raw
    }

    /// 写入主机块
    pub fn store(&mut self, values: &[u32]) -> FrResult<()> {
        if values.len() != self.len {
            return Err(FrError::invalid_input(format!(
                "buffer '{}' expects {} words, got {}",
                self.raw.label, self.len, values.len()
            )));
        }
        bytemuck::cast_slice_mut::<u8, u32>(self.raw.host_bytes_mut()).copy_from_slice(values);
        Ok(())
    }

    /// 读取主机块中的单个值
    pub fn load_at(&self, index: usize) -> FrResult<u32> {
        FrError::check_index("Word", index, self.len)?;
        Ok(bytemuck::cast_slice::<u8, u32>(self.raw.host_bytes())[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_kind_usage() {
        let storage = BufferKind::Storage.to_wgpu_usage();
        assert!(storage.contains(BufferUsages::STORAGE));
        assert!(storage.contains(BufferUsages::COPY_SRC));

        let uniform = BufferKind::Uniform.to_wgpu_usage();
        assert!(uniform.contains(BufferUsages::UNIFORM));
        assert!(!uniform.contains(BufferUsages::STORAGE));
    }
}
