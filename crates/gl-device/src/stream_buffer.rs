//! Ring buffers for per-draw uploads.
//!
//! A [`StreamBuffer`] is split into [`SEGMENTS`] sync segments. Once the write
//! cursor has moved past a segment, the next `map` drops a fence behind it;
//! when the cursor comes round again after a wrap, that fence is waited on
//! before the segment is handed out a second time.

use gl::types::{GLenum, GLuint};
use gl_driver::{GlDriver, SyncHandle, SyncWait};
use gpu_core::{DeviceError, Result, STREAM_BUFFER_SYNC_SEGMENTS};
use tracing::{debug, error, warn};

pub const SEGMENTS: usize = STREAM_BUFFER_SYNC_SEGMENTS as usize;

const MAP_ACCESS: u32 = gl::MAP_WRITE_BIT
    | gl::MAP_UNSYNCHRONIZED_BIT
    | gl::MAP_FLUSH_EXPLICIT_BIT
    | gl::MAP_INVALIDATE_RANGE_BIT;

/// Round `value` up to a multiple of `alignment`. `None` on overflow.
fn align_up(value: u32, alignment: u32) -> Option<u32> {
    if alignment <= 1 {
        return Some(value);
    }
    let rem = value % alignment;
    if rem == 0 {
        Some(value)
    } else {
        value.checked_add(alignment - rem)
    }
}

/// Writable window returned by [`StreamBuffer::map`].
#[derive(Debug)]
pub struct StreamMapping<'a> {
    /// At least the requested size, possibly more.
    pub data: &'a mut [u8],
    /// Byte offset of `data[0]` inside the buffer.
    pub offset: u32,
    pub space: u32,
}

#[derive(Debug)]
pub struct StreamBuffer {
    target: GLenum,
    name: GLuint,
    size: u32,
    segment_size: u32,
    position: u32,
    /// First segment written since the last wrap that has no fence yet.
    used_segment: usize,
    fences: [Option<SyncHandle>; SEGMENTS],
    mapped: Option<(u32, u32)>,
    wraps: u64,
    stalls: u64,
    label: &'static str,
}

impl StreamBuffer {
    pub fn create<D: GlDriver>(
        driver: &mut D,
        target: GLenum,
        size: u32,
        label: &'static str,
    ) -> Result<Self> {
        if size < STREAM_BUFFER_SYNC_SEGMENTS {
            return Err(DeviceError::InvalidArgument(format!(
                "{label} stream buffer of {size} bytes is smaller than its sync segments"
            )));
        }

        let name = driver.gen_buffer();
        if name == 0 {
            return Err(DeviceError::Unsupported("buffer objects"));
        }
        driver.bind_buffer(target, name);
        driver.buffer_data(target, size as usize, gl::STREAM_DRAW);

        debug!(label, buffer = name, size, "created stream buffer");
        Ok(Self {
            target,
            name,
            size,
            segment_size: size / STREAM_BUFFER_SYNC_SEGMENTS,
            position: 0,
            used_segment: 0,
            fences: [None; SEGMENTS],
            mapped: None,
            wraps: 0,
            stalls: 0,
            label,
        })
    }

    pub fn name(&self) -> GLuint {
        self.name
    }

    pub fn target(&self) -> GLenum {
        self.target
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Write cursor. Only meaningful while unmapped.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Offset of the current mapping, if any.
    pub fn mapped_offset(&self) -> Option<u32> {
        self.mapped.map(|(offset, _)| offset)
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    /// Fence waits that actually blocked.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    pub fn bind<D: GlDriver>(&self, driver: &mut D) {
        driver.bind_buffer(self.target, self.name);
    }

    /// Clear this buffer's target binding. Needed for `PIXEL_UNPACK_BUFFER`,
    /// where a leftover binding redirects client-memory uploads.
    pub fn unbind<D: GlDriver>(&self, driver: &mut D) {
        driver.bind_buffer(self.target, 0);
    }

    fn segment_of(&self, offset: u32) -> usize {
        ((offset / self.segment_size) as usize).min(SEGMENTS - 1)
    }

    fn segment_start(&self, segment: usize) -> u32 {
        segment as u32 * self.segment_size
    }

    /// Segments lying entirely below `offset`.
    fn segments_below(&self, offset: u32) -> usize {
        if offset >= self.size {
            SEGMENTS
        } else {
            self.segment_of(offset)
        }
    }

    pub fn map<'a, D: GlDriver>(
        &'a mut self,
        driver: &mut D,
        alignment: u32,
        min_size: u32,
    ) -> Result<StreamMapping<'a>> {
        if min_size > self.size {
            return Err(DeviceError::StreamBufferOverflow {
                requested: min_size,
                capacity: self.size,
            });
        }
        if self.mapped.is_some() {
            return Err(DeviceError::InvalidArgument(format!(
                "{} stream buffer is already mapped",
                self.label
            )));
        }

        let need = min_size.max(1);
        self.place_fences(driver, self.position);

        let mut start = align_up(self.position, alignment).unwrap_or(u32::MAX);
        if start.checked_add(need).map_or(true, |end| end > self.size) {
            self.place_fences(driver, self.size);
            self.position = 0;
            self.used_segment = 0;
            self.wraps += 1;
            start = 0;
        }

        let first = self.segment_of(start);
        let last = self.segment_of(start + need - 1);
        let mut blocked = 0;
        for segment in first..=last {
            if let Some(fence) = self.fences[segment].take() {
                match driver.client_wait_sync(fence, u64::MAX) {
                    SyncWait::AlreadySignaled => {}
                    SyncWait::ConditionSatisfied => blocked += 1,
                    wait => {
                        warn!(label = self.label, segment, ?wait, "stream buffer fence wait failed");
                        blocked += 1;
                    }
                }
                driver.delete_sync(fence);
            }
        }
        if blocked > 0 {
            self.stalls += blocked;
            warn!(label = self.label, segments = blocked, "stream buffer stalled on the GPU");
        }

        let end = (last + 1..SEGMENTS)
            .find(|&segment| self.fences[segment].is_some())
            .map_or(self.size, |segment| self.segment_start(segment));
        let space = end - start;

        self.bind(driver);
        let ptr = driver.map_buffer_range(self.target, start as usize, space as usize, MAP_ACCESS);
        if ptr.is_null() {
            error!(label = self.label, offset = start, space, "failed to map stream buffer");
            if self.target == gl::PIXEL_UNPACK_BUFFER {
                self.unbind(driver);
            }
            return Err(DeviceError::MapFailed(self.label));
        }
        self.mapped = Some((start, space));

        // SAFETY: the driver returned a writable mapping of `space` bytes which
        // stays valid until `unmap`, and `unmap` needs `&mut self`, which the
        // returned slice keeps borrowed.
        let data = unsafe { std::slice::from_raw_parts_mut(ptr, space as usize) };
        Ok(StreamMapping {
            data,
            offset: start,
            space,
        })
    }

    /// Finish the current mapping, keeping the first `used` bytes. Returns
    /// the committed `(offset, length)`; the length is clamped to the mapping.
    pub fn unmap<D: GlDriver>(&mut self, driver: &mut D, used: u32) -> Option<(u32, u32)> {
        debug_assert!(self.mapped.is_some(), "unmap of unmapped {} stream buffer", self.label);
        let Some((offset, space)) = self.mapped.take() else {
            error!(label = self.label, "unmap without a mapping");
            return None;
        };
        debug_assert!(
            used <= space,
            "{} stream buffer: used {used} of a {space} byte mapping",
            self.label
        );
        let used = used.min(space);

        self.bind(driver);
        if used > 0 {
            driver.flush_mapped_buffer_range(self.target, 0, used as usize);
        }
        driver.unmap_buffer(self.target);
        self.position = offset + used;
        Some((offset, used))
    }

    /// Fence every segment the cursor has fully moved past since the last
    /// fence was placed. Done at map time so the fences trail the draws that
    /// read the data.
    fn place_fences<D: GlDriver>(&mut self, driver: &mut D, upto: u32) {
        let end = self.segments_below(upto);
        for segment in self.used_segment..end {
            if let Some(old) = self.fences[segment].take() {
                driver.delete_sync(old);
            }
            self.fences[segment] = Some(driver.fence_sync());
        }
        self.used_segment = self.used_segment.max(end);
    }

    pub fn destroy<D: GlDriver>(&mut self, driver: &mut D) {
        if self.name == 0 {
            return;
        }
        if self.mapped.take().is_some() {
            self.bind(driver);
            driver.unmap_buffer(self.target);
        }
        for fence in self.fences.iter_mut().filter_map(Option::take) {
            driver.delete_sync(fence);
        }
        driver.delete_buffer(self.name);
        debug!(label = self.label, buffer = self.name, wraps = self.wraps, stalls = self.stalls, "destroyed stream buffer");
        self.name = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_driver::{GlCall, RecordingDriver};
    use pretty_assertions::assert_eq;

    fn stream(driver: &mut RecordingDriver, size: u32) -> StreamBuffer {
        StreamBuffer::create(driver, gl::ARRAY_BUFFER, size, "vertex").unwrap()
    }

    #[test]
    fn align_up_handles_odd_strides() {
        assert_eq!(align_up(0, 12), Some(0));
        assert_eq!(align_up(13, 12), Some(24));
        assert_eq!(align_up(7, 0), Some(7));
        assert_eq!(align_up(u32::MAX - 1, 4), None);
    }

    #[test]
    fn map_unmap_advances_by_used_size() {
        let mut driver = RecordingDriver::new();
        let mut buffer = stream(&mut driver, 1024);

        let mapping = buffer.map(&mut driver, 4, 40).unwrap();
        assert_eq!(mapping.offset, 0);
        assert!(mapping.space >= 40);
        mapping.data[..4].copy_from_slice(&[9, 8, 7, 6]);
        buffer.unmap(&mut driver, 40);
        assert_eq!(buffer.position(), 40);

        let mapping = buffer.map(&mut driver, 4, 8).unwrap();
        assert_eq!(mapping.offset, 40);
        buffer.unmap(&mut driver, 8);
        assert_eq!(buffer.position(), 48);

        assert_eq!(&driver.buffer_contents(buffer.name())[..4], &[9, 8, 7, 6]);
        assert!(driver.calls().contains(&GlCall::FlushMappedBufferRange {
            target: gl::ARRAY_BUFFER,
            offset: 0,
            length: 8
        }));
    }

    #[test]
    fn unmap_reports_the_committed_range() {
        let mut driver = RecordingDriver::new();
        let mut buffer = stream(&mut driver, 1024);

        buffer.map(&mut driver, 4, 40).unwrap();
        assert_eq!(buffer.unmap(&mut driver, 40), Some((0, 40)));
        buffer.map(&mut driver, 16, 8).unwrap();
        assert_eq!(buffer.unmap(&mut driver, 0), Some((48, 0)));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn oversized_unmap_is_clamped_to_the_mapping() {
        let mut driver = RecordingDriver::new();
        let mut buffer = stream(&mut driver, 1024);

        let space = buffer.map(&mut driver, 4, 40).unwrap().space;
        assert_eq!(buffer.unmap(&mut driver, space + 100), Some((0, space)));
        assert_eq!(buffer.position(), space);
        assert_eq!(buffer.unmap(&mut driver, 4), None);
    }

    #[test]
    fn cursor_is_aligned_before_mapping() {
        let mut driver = RecordingDriver::new();
        let mut buffer = stream(&mut driver, 1024);

        buffer.map(&mut driver, 1, 10).unwrap();
        buffer.unmap(&mut driver, 10);
        let mapping = buffer.map(&mut driver, 12, 24).unwrap();
        assert_eq!(mapping.offset, 12);
    }

    #[test]
    fn oversized_request_fails() {
        let mut driver = RecordingDriver::new();
        let mut buffer = stream(&mut driver, 256);

        let err = buffer.map(&mut driver, 1, 257).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::StreamBufferOverflow {
                requested: 257,
                capacity: 256
            }
        ));
        assert!(!buffer.is_mapped());
    }

    #[test]
    fn double_map_is_rejected() {
        let mut driver = RecordingDriver::new();
        let mut buffer = stream(&mut driver, 256);
        buffer.map(&mut driver, 1, 16).unwrap();
        assert!(matches!(
            buffer.map(&mut driver, 1, 16),
            Err(DeviceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn wrap_waits_for_overlapping_segments() {
        let mut driver = RecordingDriver::new();
        // 100 byte segments.
        let mut buffer = stream(&mut driver, 1600);

        buffer.map(&mut driver, 1, 700).unwrap();
        buffer.unmap(&mut driver, 700);
        buffer.map(&mut driver, 1, 600).unwrap();
        buffer.unmap(&mut driver, 600);
        assert_eq!(driver.live_fences(), 7);

        // 1300 + 400 does not fit: fence the tail, restart at 0 and wait on
        // segments 0..=3.
        let mapping = buffer.map(&mut driver, 1, 400).unwrap();
        assert_eq!(mapping.offset, 0);
        // Segment 4 is still fenced, so the mapping stops in front of it.
        assert_eq!(mapping.space, 400);

        assert_eq!(buffer.wraps(), 1);
        assert_eq!(buffer.stalls(), 4);
        assert_eq!(driver.waits().len(), 4);
        assert_eq!(driver.live_fences(), 12);
    }

    #[test]
    fn signalled_fences_do_not_count_as_stalls() {
        let mut driver = RecordingDriver::new();
        let mut buffer = stream(&mut driver, 1600);

        buffer.map(&mut driver, 1, 1500).unwrap();
        buffer.unmap(&mut driver, 1500);
        buffer.map(&mut driver, 1, 50).unwrap();
        buffer.unmap(&mut driver, 50);
        driver.signal_all_fences();

        let mapping = buffer.map(&mut driver, 1, 200).unwrap();
        assert_eq!(mapping.offset, 0);
        assert_eq!(buffer.stalls(), 0);
        assert_eq!(driver.waits().len(), 2);
    }

    #[test]
    fn destroy_releases_fences_and_buffer() {
        let mut driver = RecordingDriver::new();
        let mut buffer = stream(&mut driver, 1600);
        buffer.map(&mut driver, 1, 900).unwrap();
        buffer.unmap(&mut driver, 900);
        buffer.map(&mut driver, 1, 10).unwrap();
        buffer.unmap(&mut driver, 10);

        buffer.destroy(&mut driver);
        buffer.destroy(&mut driver);
        assert_eq!(driver.live_fences(), 0);
        assert_eq!(driver.live_count(gl_driver::ObjectKind::Buffer), 0);
        assert!(driver.invalid_deletes().is_empty());
    }

    #[test]
    fn failed_unpack_map_leaves_no_binding() {
        let mut driver = RecordingDriver::new();
        let mut buffer =
            StreamBuffer::create(&mut driver, gl::PIXEL_UNPACK_BUFFER, 1024, "texture").unwrap();
        // Storage gone: the driver hands back a null mapping.
        driver.delete_buffer(buffer.name());

        let err = buffer.map(&mut driver, 4, 64).unwrap_err();
        assert!(matches!(err, DeviceError::MapFailed("texture")));
        assert!(!buffer.is_mapped());
        assert_eq!(driver.bound_buffer(gl::PIXEL_UNPACK_BUFFER), 0);
    }
}
