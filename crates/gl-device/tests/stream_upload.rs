mod common;

use gl_device::StreamBuffer;
use gl_driver::{GlCall, RecordingDriver, SyncHandle};
use gpu_core::{GpuDevice, TextureDesc, TextureFormat, TextureRegion, TextureUsage};
use pretty_assertions::assert_eq;

fn fences_placed(driver: &RecordingDriver) -> Vec<SyncHandle> {
    driver
        .calls()
        .iter()
        .filter_map(|c| match c {
            GlCall::FenceSync(handle) => Some(*handle),
            _ => None,
        })
        .collect()
}

// 1024 bytes in 16 segments of 64.
fn ring(driver: &mut RecordingDriver) -> StreamBuffer {
    StreamBuffer::create(driver, gl::ARRAY_BUFFER, 1024, "test").unwrap()
}

fn write(buffer: &mut StreamBuffer, driver: &mut RecordingDriver, size: u32) -> (u32, u32) {
    let mapping = buffer.map(driver, 1, size).unwrap();
    let placed = (mapping.offset, mapping.space);
    buffer.unmap(driver, size);
    placed
}

#[test]
fn wrap_stops_short_of_fenced_segments() {
    let mut driver = RecordingDriver::new();
    let mut buffer = ring(&mut driver);

    assert_eq!(write(&mut buffer, &mut driver, 300), (0, 1024));
    assert_eq!(write(&mut buffer, &mut driver, 300), (300, 724));
    assert_eq!(write(&mut buffer, &mut driver, 300), (600, 424));
    assert!(driver.waits().is_empty());

    // 900 + 300 does not fit; the cursor wraps to the start.
    let (offset, space) = write(&mut buffer, &mut driver, 300);
    assert_eq!(buffer.wraps(), 1);
    assert_eq!(offset, 0);
    // Segments 0..=4 were waited on; segment 5 still holds a fence.
    assert_eq!(space, 5 * 64);

    let placed = fences_placed(&driver);
    assert_eq!(placed.len(), 16);
    assert_eq!(driver.waits(), &placed[..5]);
    assert_eq!(driver.live_fences(), 11);
    assert_eq!(buffer.stalls(), 5);
}

#[test]
fn signaled_fences_do_not_stall() {
    let mut driver = RecordingDriver::new();
    let mut buffer = ring(&mut driver);

    for _ in 0..3 {
        write(&mut buffer, &mut driver, 300);
    }
    write(&mut buffer, &mut driver, 100);
    driver.signal_all_fences();

    let (offset, _) = write(&mut buffer, &mut driver, 300);
    assert_eq!(offset, 0);
    assert_eq!(buffer.stalls(), 0);
    assert_eq!(driver.waits().len(), 5);
}

#[test]
fn mapped_ranges_never_overlap_a_live_fence() {
    const SEGMENT: u32 = 1024 / 16;
    let mut driver = RecordingDriver::new();
    let mut buffer = ring(&mut driver);

    // Replay the fence calls: each new fence covers the lowest segment that
    // has none.
    let mut segments: [Option<SyncHandle>; 16] = [None; 16];
    let sizes = [200u32, 90, 333, 17, 500, 64, 700, 1, 256, 999, 128, 640, 40, 40, 900];
    for (i, size) in sizes.into_iter().enumerate() {
        let mapping = buffer.map(&mut driver, 4, size).unwrap();
        let (start, end) = (mapping.offset, mapping.offset + mapping.space);

        for call in driver.take_calls() {
            match call {
                GlCall::FenceSync(handle) => {
                    let free = segments.iter().position(Option::is_none).unwrap();
                    segments[free] = Some(handle);
                }
                GlCall::DeleteSync(handle) => {
                    for slot in segments.iter_mut().filter(|s| **s == Some(handle)) {
                        *slot = None;
                    }
                }
                _ => {}
            }
        }

        assert!(end - start >= size, "map {i} is smaller than requested");
        for (segment, fence) in segments.iter().enumerate() {
            let (lo, hi) = (segment as u32 * SEGMENT, (segment as u32 + 1) * SEGMENT);
            assert!(
                fence.is_none() || hi <= start || lo >= end,
                "map {i} [{start}, {end}) overlaps fenced segment {segment}"
            );
        }
        buffer.unmap(&mut driver, size);
        driver.clear_calls();
    }
    assert!(buffer.wraps() >= 2);
    assert_eq!(
        segments.iter().flatten().count(),
        driver.live_fences()
    );
}

#[test]
fn texture_uploads_go_through_the_staging_ring() {
    let mut dev = common::device();
    let desc = TextureDesc::new_2d(64, 64, TextureFormat::Rgba8, TextureUsage::Texture);
    let tex = dev.create_texture(&desc, None, 0).unwrap();
    let staging = dev.streams().texture.name();

    // 8x8 RGBA is 256 bytes; 4096 bytes of staging holds sixteen of them.
    let pixels = vec![0x7fu8; 8 * 8 * 4];
    for i in 0..20 {
        let region = TextureRegion::at((i % 8) * 8, (i / 8) * 8);
        dev.update_texture(tex, region, 8, 8, &pixels, 8 * 4).unwrap();
    }

    assert_eq!(dev.streams().texture.wraps(), 1);
    assert_eq!(dev.stats().num_uploads, 20);
    let from_ring = dev.driver().count_calls(|c| {
        matches!(c, GlCall::TexSubImage { unpack_offset: Some(_), .. })
    });
    assert_eq!(from_ring, 20);
    assert_eq!(dev.driver().buffer_contents(staging)[0], 0x7f);
}

#[test]
fn client_memory_uploads_never_read_from_the_staging_buffer() {
    let mut dev = common::device();
    assert_eq!(dev.driver().bound_buffer(gl::PIXEL_UNPACK_BUFFER), 0);

    // Initial data is always uploaded straight from client memory.
    let desc = TextureDesc::new_2d(4, 4, TextureFormat::Rgba8, TextureUsage::Texture);
    let small = dev.create_texture(&desc, Some(&[0u8; 64]), 0).unwrap();

    // A staged upload in between must give the unpack target back.
    dev.update_texture(small, TextureRegion::origin(), 2, 2, &[1u8; 16], 8).unwrap();

    // 64x64 RGBA is 16 KiB, more than the 4 KiB staging ring.
    let desc = TextureDesc::new_2d(64, 64, TextureFormat::Rgba8, TextureUsage::Texture);
    let large = dev.create_texture(&desc, None, 0).unwrap();
    dev.update_texture(large, TextureRegion::origin(), 64, 64, &vec![2u8; 64 * 64 * 4], 256)
        .unwrap();

    let bindings = dev.driver().client_upload_unpack_bindings();
    assert_eq!(bindings, &[0, 0]);
    let staged = dev.driver().count_calls(|c| {
        matches!(c, GlCall::TexSubImage { unpack_offset: Some(_), .. })
    });
    assert_eq!(staged, 1);
}
