// crates/fr_runtime/src/queue.rs

//! 命令队列
//!
//! 设备持有的唯一提交通道。核函数执行与缓冲区读回都录制进一个
//! 打开的命令编码器，[`CommandQueue::flush_and_set_marker`] 一次性
//! 提交并附加完成标记。
//!
//! 排序：队列内按录制顺序执行，计算通道边界使前序写入对后续派发
//! 可见；主机写入在下一次提交开始时生效，因此必须发生在本批次
//! 任何核函数录制之前。

use crate::buffer::RawDeviceBuffer;
use crate::kernel::ComputeKernel;
use fr_foundation::{FrError, FrResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wgpu::{CommandEncoder, CommandEncoderDescriptor, ComputePassDescriptor, Device, Queue};

/// 命令队列
pub struct CommandQueue {
    device: Arc<Device>,
    queue: Arc<Queue>,
    encoder: Option<CommandEncoder>,
    busy: Arc<AtomicBool>,
    errored: Arc<AtomicBool>,
}

impl CommandQueue {
    pub(crate) fn new(
        device: Arc<Device>,
        queue: Arc<Queue>,
        busy: Arc<AtomicBool>,
        errored: Arc<AtomicBool>,
    ) -> Self {
        Self {
            device,
            queue,
            encoder: None,
            busy,
            errored,
        }
    }

    fn check_errored(&self) -> FrResult<()> {
        if self.errored.load(Ordering::Acquire) {
            Err(FrError::DeviceErrored(
                "submit rejected, device previously failed".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn encoder(&mut self) -> &mut CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&CommandEncoderDescriptor {
                    label: Some("freshet batch"),
                })
        })
    }

    /// 录制一次核函数执行（非阻塞）
    pub fn submit(&mut self, kernel: &ComputeKernel, alt: bool) -> FrResult<()> {
        self.check_errored()?;
        let encoder = self.encoder();
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some(kernel.label()),
            timestamp_writes: None,
        });
        kernel.record(&mut pass, alt);
        Ok(())
    }

    /// 队列屏障
    ///
    /// 屏障之前录制的命令先于其后录制的命令完成。本实现中每次派发
    /// 独占一个计算通道，通道边界已构成全序点；屏障保留为调用方
    /// 显式标注阶段边界的接口。
    pub fn barrier(&mut self) -> FrResult<()> {
        self.check_errored()
    }

    /// 入队整块主机→设备写入（非阻塞）
    ///
    /// 写入在下一次提交开始时生效，须在录制本批次核函数之前调用。
    pub fn enqueue_write(&mut self, buffer: &RawDeviceBuffer) -> FrResult<()> {
        self.check_errored()?;
        self.queue.write_buffer(buffer.raw(), 0, buffer.host_bytes());
        Ok(())
    }

    /// 入队部分主机→设备写入（非阻塞）
    ///
    /// 偏移与长度须按 4 字节对齐（拷贝对齐约束）。
    pub fn enqueue_write_partial(
        &mut self,
        buffer: &RawDeviceBuffer,
        offset_bytes: u64,
        bytes: &[u8],
    ) -> FrResult<()> {
        self.check_errored()?;
        if offset_bytes + bytes.len() as u64 > buffer.size_bytes() {
            return Err(FrError::invalid_input(format!(
                "partial write exceeds buffer '{}' capacity",
                buffer.label()
            )));
        }
        if offset_bytes % 4 != 0 || bytes.len() % 4 != 0 {
            return Err(FrError::invalid_input(
                "partial write must be 4-byte aligned".to_string(),
            ));
        }
        self.queue.write_buffer(buffer.raw(), offset_bytes, bytes);
        Ok(())
    }

    /// 入队设备→暂存读回（非阻塞）
    ///
    /// 内容在 [`CommandQueue::block_until_finished`] 后由
    /// [`RawDeviceBuffer::resolve_read`] 解析。
    pub fn enqueue_read(&mut self, buffer: &RawDeviceBuffer) -> FrResult<()> {
        self.check_errored()?;
        let size = buffer.size_bytes().max(4);
        let staging = buffer.staging().ok_or_else(|| {
            FrError::invalid_state(format!("buffer '{}' was not created readable", buffer.label()))
        })?;
        self.encoder()
            .copy_buffer_to_buffer(buffer.raw(), 0, staging, 0, size);
        Ok(())
    }

    /// 入队部分设备→暂存读回（非阻塞）
    ///
    /// 区间在排空后由 [`RawDeviceBuffer::resolve_read_range`] 解析。
    pub fn enqueue_read_partial(
        &mut self,
        buffer: &RawDeviceBuffer,
        offset_bytes: u64,
        len_bytes: u64,
    ) -> FrResult<()> {
        self.check_errored()?;
        if offset_bytes + len_bytes > buffer.size_bytes() {
            return Err(FrError::invalid_input(format!(
                "partial read exceeds buffer '{}' capacity",
                buffer.label()
            )));
        }
        if offset_bytes % 4 != 0 || len_bytes % 4 != 0 {
            return Err(FrError::invalid_input(
                "partial read must be 4-byte aligned".to_string(),
            ));
        }
        let staging = buffer.staging().ok_or_else(|| {
            FrError::invalid_state(format!("buffer '{}' was not created readable", buffer.label()))
        })?;
        self.encoder().copy_buffer_to_buffer(
            buffer.raw(),
            offset_bytes,
            staging,
            offset_bytes,
            len_bytes,
        );
        Ok(())
    }

    /// 提交已录制的命令并附加完成标记
    ///
    /// 标记在其之前提交的所有工作完成时解析，解析时设备忙标志清零。
    pub fn flush_and_set_marker(&mut self) -> FrResult<()> {
        self.check_errored()?;
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.busy.store(true, Ordering::Release);
        let busy = self.busy.clone();
        self.queue.on_submitted_work_done(move || {
            busy.store(false, Ordering::Release);
        });
        Ok(())
    }

    /// 阻塞至队列排空
    pub fn block_until_finished(&mut self) -> FrResult<()> {
        if self.encoder.is_some() {
            self.flush_and_set_marker()?;
        }
        let _ = self.device.poll(wgpu::Maintain::Wait);
        self.busy.store(false, Ordering::Release);
        Ok(())
    }

    /// 设备是否有未完成的已提交工作
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}
