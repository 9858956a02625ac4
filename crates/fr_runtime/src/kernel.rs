// crates/fr_runtime/src/kernel.rs

//! 计算核
//!
//! 固定参数表（缓冲区绑定）、工作组形状与全局形状。乒乓缓冲通过
//! 预建的备用绑定组切换，提交时按交替标志选择。

use crate::buffer::RawDeviceBuffer;
use crate::context::GpuDevice;
use crate::program::Program;
use fr_foundation::{FrError, FrResult};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, ComputePipeline, ComputePipelineDescriptor,
};

/// 计算核
pub struct ComputeKernel {
    label: String,
    pipeline: ComputePipeline,
    /// 绑定组；索引 0 为主参数表，索引 1（如有）为乒乓交换后的参数表
    bind_groups: Vec<BindGroup>,
    workgroup: [u32; 3],
    global: [u32; 3],
}

impl ComputeKernel {
    /// 核函数标签
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 工作组形状
    pub fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup
    }

    /// 全局工作形状（工作项数）
    pub fn global_size(&self) -> [u32; 3] {
        self.global
    }

    /// 各维度派发的工作组数
    pub fn dispatch_counts(&self) -> [u32; 3] {
        [
            self.global[0].div_ceil(self.workgroup[0].max(1)),
            self.global[1].div_ceil(self.workgroup[1].max(1)),
            self.global[2].div_ceil(self.workgroup[2].max(1)),
        ]
    }

    /// 录制一次执行
    ///
    /// `alt` 选择绑定组（乒乓缓冲的当前朝向）；无备用绑定组的核
    /// 忽略该参数。
    pub(crate) fn record<'a>(&'a self, pass: &mut wgpu::ComputePass<'a>, alt: bool) {
        let group = if alt && self.bind_groups.len() > 1 {
            &self.bind_groups[1]
        } else {
            &self.bind_groups[0]
        };
        let counts = self.dispatch_counts();
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, group, &[]);
        pass.dispatch_workgroups(counts[0], counts[1], counts[2]);
    }
}

/// 计算核构建器
pub struct KernelBuilder<'a> {
    program: &'a Program,
    entry_point: &'a str,
    workgroup: [u32; 3],
    global: [u32; 3],
    args: Vec<(u32, &'a RawDeviceBuffer)>,
    alt_args: Option<Vec<(u32, &'a RawDeviceBuffer)>>,
}

impl<'a> KernelBuilder<'a> {
    /// 从程序入口点创建构建器
    pub fn new(program: &'a Program, entry_point: &'a str) -> Self {
        Self {
            program,
            entry_point,
            workgroup: [1, 1, 1],
            global: [1, 1, 1],
            args: Vec::new(),
            alt_args: None,
        }
    }

    /// 设置工作组形状
    pub fn group_size(mut self, x: u32, y: u32, z: u32) -> Self {
        self.workgroup = [x.max(1), y.max(1), z.max(1)];
        self
    }

    /// 设置全局工作形状
    pub fn global_size(mut self, x: u32, y: u32, z: u32) -> Self {
        self.global = [x.max(1), y.max(1), z.max(1)];
        self
    }

    /// 绑定参数表（绑定序号从零依次递增）
    pub fn bind(mut self, args: &[&'a RawDeviceBuffer]) -> Self {
        self.args = args
            .iter()
            .enumerate()
            .map(|(i, b)| (i as u32, *b))
            .collect();
        self
    }

    /// 绑定参数表（显式绑定序号）
    ///
    /// 用于入口点只消费模块中部分绑定声明的场合。
    pub fn bind_entries(mut self, args: &[(u32, &'a RawDeviceBuffer)]) -> Self {
        self.args = args.to_vec();
        self
    }

    /// 绑定乒乓交换后的备用参数表
    pub fn bind_alternate(mut self, args: &[&'a RawDeviceBuffer]) -> Self {
        self.alt_args = Some(
            args.iter()
                .enumerate()
                .map(|(i, b)| (i as u32, *b))
                .collect(),
        );
        self
    }

    /// 绑定备用参数表（显式绑定序号）
    pub fn bind_alternate_entries(mut self, args: &[(u32, &'a RawDeviceBuffer)]) -> Self {
        self.alt_args = Some(args.to_vec());
        self
    }

    /// 构建计算核
    pub fn build(self, gpu: &GpuDevice) -> FrResult<ComputeKernel> {
        let device = gpu.raw_device();
        let label = format!("{}::{}", self.program.label(), self.entry_point);

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some(&label),
            layout: None,
            module: self.program.module(),
            entry_point: Some(self.entry_point),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let layout = pipeline.get_bind_group_layout(0);
        let make_group = |args: &[(u32, &RawDeviceBuffer)], suffix: &str| {
            let entries: Vec<BindGroupEntry> = args
                .iter()
                .map(|&(binding, buf)| BindGroupEntry {
                    binding,
                    resource: buf.as_entire_binding(),
                })
                .collect();
            device.create_bind_group(&BindGroupDescriptor {
                label: Some(&format!("{label}{suffix}")),
                layout: &layout,
                entries: &entries,
            })
        };

        let mut bind_groups = vec![make_group(&self.args, "")];
        if let Some(alt) = &self.alt_args {
            if alt.len() != self.args.len() {
                return Err(FrError::invalid_input(format!(
                    "kernel '{label}': alternate argument list length mismatch"
                )));
            }
            bind_groups.push(make_group(alt, "_alt"));
        }

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(FrError::ShaderCompilation {
                label,
                message: err.to_string(),
            });
        }

        Ok(ComputeKernel {
            label,
            pipeline,
            bind_groups,
            workgroup: self.workgroup,
            global: self.global,
        })
    }
}

#[cfg(test)]
mod tests {
    // dispatch 计数的纯算术部分
    #[test]
    fn test_dispatch_count_arithmetic() {
        let global: u32 = 100;
        let group: u32 = 16;
        assert_eq!(global.div_ceil(group), 7);
        assert_eq!(96u32.div_ceil(group), 6);
    }
}
