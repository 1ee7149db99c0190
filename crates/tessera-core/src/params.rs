// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The per-frame parameter block uploaded to every device before submission.

use crate::workload::DeviceSlice;
use bytemuck::{Pod, Zeroable};

/// Camera position used when nothing else drives the camera.
pub const DEFAULT_CAMERA_POS: [f32; 4] = [13.0, 11.0, -3.0, 0.0];
/// Camera direction used when the host reports no cursor.
pub const DEFAULT_CAMERA_DIR: [f32; 4] = [-13.0, -11.0, 3.0, 0.0];

/// Pixels of cursor travel per radian of camera rotation.
const CURSOR_RADIANS_SCALE: f64 = 500.0;

/// GPU-visible parameters for one render call on one device.
///
/// The layout matches a std140 uniform block: the two `vec4`s start on a
/// 16-byte boundary and there is no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameParams {
    /// Index of the render call within the current accumulation run.
    pub number: u32,
    /// Samples per pixel traced by this render call.
    pub samples_per_render_call: u32,
    /// Pixel offset of the device's band within the image.
    pub offset: [u32; 2],
    /// Full image size in pixels.
    pub image_size: [u32; 2],
    /// Frame counter split into low and high words.
    pub t: [u32; 2],
    /// Camera position (xyz, w unused).
    pub camera_pos: [f32; 4],
    /// Camera view direction (xyz, w unused).
    pub camera_dir: [f32; 4],
}

impl FrameParams {
    /// Builds the parameters for `slice` with the default camera.
    pub fn for_slice(
        slice: &DeviceSlice,
        image_size: [u32; 2],
        samples_per_render_call: u32,
        number: u32,
        frame: u64,
    ) -> Self {
        Self {
            number,
            samples_per_render_call,
            offset: [0, slice.offset],
            image_size,
            t: [frame as u32, (frame >> 32) as u32],
            camera_pos: DEFAULT_CAMERA_POS,
            camera_dir: DEFAULT_CAMERA_DIR,
        }
    }

    /// Points the camera according to a host cursor position, if any.
    pub fn with_cursor(mut self, cursor: Option<(f64, f64)>) -> Self {
        if let Some((x, y)) = cursor {
            self.camera_dir = camera_dir_from_cursor(x, y);
        }
        self
    }

    /// The raw bytes to upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads a block back from uploaded bytes, or `None` if the size is wrong.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytemuck::try_pod_read_unaligned(bytes).ok()
    }
}

/// Maps a cursor position in pixels to a unit view direction.
pub fn camera_dir_from_cursor(x: f64, y: f64) -> [f32; 4] {
    let yaw = x / CURSOR_RADIANS_SCALE;
    let pitch = y / CURSOR_RADIANS_SCALE;
    [
        (yaw.sin() * pitch.cos()) as f32,
        (-pitch.sin()) as f32,
        (yaw.cos() * pitch.cos()) as f32,
        0.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<FrameParams>(), 64);
        assert_eq!(std::mem::offset_of!(FrameParams, camera_pos), 32);
        assert_eq!(std::mem::offset_of!(FrameParams, camera_dir), 48);
    }

    #[test]
    fn test_for_slice_uses_slice_offset_and_splits_frame_counter() {
        let slice = DeviceSlice {
            index: 1,
            amount: 300,
            offset: 540,
        };
        let params = FrameParams::for_slice(&slice, [1920, 1080], 4, 2, (7u64 << 32) | 9);

        assert_eq!(params.offset, [0, 540]);
        assert_eq!(params.image_size, [1920, 1080]);
        assert_eq!(params.samples_per_render_call, 4);
        assert_eq!(params.number, 2);
        assert_eq!(params.t, [9, 7]);
        assert_eq!(params.camera_pos, DEFAULT_CAMERA_POS);
        assert_eq!(params.camera_dir, DEFAULT_CAMERA_DIR);
        assert_eq!(params.as_bytes().len(), 64);
    }

    #[test]
    fn test_from_bytes_rejects_partial_blocks() {
        let slice = DeviceSlice {
            index: 0,
            amount: 8,
            offset: 0,
        };
        let params = FrameParams::for_slice(&slice, [8, 8], 1, 0, 3)
            .with_cursor(Some((100.0, 40.0)));
        let bytes = params.as_bytes();

        assert_eq!(FrameParams::from_bytes(bytes), Some(params));
        assert_eq!(FrameParams::from_bytes(&bytes[..32]), None);
        assert_eq!(FrameParams::from_bytes(&[]), None);
    }

    #[test]
    fn test_cursor_at_origin_looks_down_z() {
        let dir = camera_dir_from_cursor(0.0, 0.0);
        assert_relative_eq!(dir[0], 0.0);
        assert_relative_eq!(dir[1], 0.0);
        assert_relative_eq!(dir[2], 1.0);
    }

    #[test]
    fn test_cursor_direction_is_unit_length() {
        let dir = camera_dir_from_cursor(812.0, -230.0);
        let len = (dir[0] * dir[0] + dir[1] * dir[1] + dir[2] * dir[2]).sqrt();
        assert_relative_eq!(len, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_without_cursor_keeps_default_direction() {
        let slice = DeviceSlice {
            index: 0,
            amount: 1,
            offset: 0,
        };
        let params = FrameParams::for_slice(&slice, [4, 4], 1, 0, 0).with_cursor(None);
        assert_eq!(params.camera_dir, DEFAULT_CAMERA_DIR);

        let moved = params.with_cursor(Some((250.0, 0.0)));
        assert_relative_eq!(moved.camera_dir[0], (0.5f64).sin() as f32);
    }
}
