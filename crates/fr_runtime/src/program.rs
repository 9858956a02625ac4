// crates/fr_runtime/src/program.rs

//! 程序编译
//!
//! 将注册常量生成的头部与若干段着色器源码拼接后编译为一个模块。
//! 常量在编译期注入，避免每个核函数携带一份运行期配置。

use crate::context::GpuDevice;
use fr_foundation::{FrError, FrResult};
use std::fmt::Write as _;
use wgpu::{ShaderModule, ShaderModuleDescriptor, ShaderSource};

/// 程序构建器
///
/// # 示例
///
/// ```ignore
/// let program = device.compile(
///     ProgramBuilder::new("godunov")
///         .constant_u32("DOMAIN_COLS", 100)
///         .constant_real("VERY_SMALL", 1e-10)
///         .append(shaders::COMMON)
///         .append(shaders::GODUNOV),
/// )?;
/// ```
pub struct ProgramBuilder {
    label: String,
    header: String,
    sources: Vec<&'static str>,
}

impl ProgramBuilder {
    /// 创建构建器
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            header: String::from("alias real = f32;\n"),
            sources: Vec::new(),
        }
    }

    /// 注册实数常量
    pub fn constant_real(mut self, name: &str, value: f64) -> Self {
        // 以科学计数法输出，保留 f32 可精确往返的位数
        let _ = writeln!(self.header, "const {}: real = {:e};", name, value as f32);
        self
    }

    /// 注册无符号整型常量
    pub fn constant_u32(mut self, name: &str, value: u32) -> Self {
        let _ = writeln!(self.header, "const {}: u32 = {}u;", name, value);
        self
    }

    /// 注册布尔常量
    pub fn constant_bool(mut self, name: &str, value: bool) -> Self {
        let _ = writeln!(self.header, "const {}: bool = {};", name, value);
        self
    }

    /// 追加一段源码
    pub fn append(mut self, source: &'static str) -> Self {
        self.sources.push(source);
        self
    }

    /// 拼接完整源码
    pub fn assemble(&self) -> String {
        let mut out = String::with_capacity(
            self.header.len() + self.sources.iter().map(|s| s.len() + 2).sum::<usize>(),
        );
        out.push_str(&self.header);
        for src in &self.sources {
            out.push('\n');
            out.push_str(src);
        }
        out
    }

    /// 编译为着色器模块
    ///
    /// 通过错误作用域捕获编译失败。
    pub(crate) fn compile(self, device: &GpuDevice) -> FrResult<Program> {
        let source = self.assemble();

        device
            .raw_device()
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device
            .raw_device()
            .create_shader_module(ShaderModuleDescriptor {
                label: Some(&self.label),
                source: ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = pollster::block_on(device.raw_device().pop_error_scope()) {
            return Err(FrError::ShaderCompilation {
                label: self.label,
                message: err.to_string(),
            });
        }

        Ok(Program {
            label: self.label,
            module,
        })
    }
}

/// 编译完成的程序
pub struct Program {
    label: String,
    module: ShaderModule,
}

impl Program {
    /// 程序标签
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 底层着色器模块
    pub(crate) fn module(&self) -> &ShaderModule {
        &self.module
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_header_first() {
        let builder = ProgramBuilder::new("t")
            .constant_u32("DOMAIN_COLS", 64)
            .constant_bool("DYNAMIC_DT", true)
            .append("fn body() {}");
        let src = builder.assemble();
        assert!(src.starts_with("alias real = f32;"));
        assert!(src.contains("const DOMAIN_COLS: u32 = 64u;"));
        assert!(src.contains("const DYNAMIC_DT: bool = true;"));
        assert!(src.ends_with("fn body() {}"));
    }

    #[test]
    fn test_real_constant_formatting() {
        let builder = ProgramBuilder::new("t").constant_real("VERY_SMALL", 1e-10);
        assert!(builder.assemble().contains("const VERY_SMALL: real = 1e-10;"));
    }
}
