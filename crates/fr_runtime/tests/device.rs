// crates/fr_runtime/tests/device.rs

//! 设备门面集成测试
//!
//! 需要实际 GPU 硬件，默认 ignored。

use fr_runtime::{BufferKind, DeviceSelection, GpuDevice, RawDeviceBuffer};

#[test]
#[ignore = "Requires GPU hardware"]
fn buffer_write_read_roundtrip() {
    let device = GpuDevice::acquire(DeviceSelection::HighPerformance).unwrap();
    let mut queue = device.take_queue().unwrap();

    let mut buffer =
        RawDeviceBuffer::new(&device, "roundtrip", 1024, BufferKind::Storage, true).unwrap();
    for (i, byte) in buffer.host_bytes_mut().iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    let expected = buffer.host_bytes().to_vec();

    // 无核函数写入时，写入后读回必须返回相同字节
    queue.enqueue_write(&buffer).unwrap();
    queue.enqueue_read(&buffer).unwrap();
    queue.block_until_finished().unwrap();
    buffer.resolve_read().unwrap();

    assert_eq!(buffer.host_bytes(), expected.as_slice());
}

#[test]
#[ignore = "Requires GPU hardware"]
fn marker_clears_busy_flag() {
    let device = GpuDevice::acquire(DeviceSelection::HighPerformance).unwrap();
    let mut queue = device.take_queue().unwrap();

    let buffer =
        RawDeviceBuffer::new(&device, "marker", 64, BufferKind::Storage, false).unwrap();
    queue.enqueue_write(&buffer).unwrap();
    queue.flush_and_set_marker().unwrap();
    queue.block_until_finished().unwrap();
    assert!(!queue.is_busy());
}
