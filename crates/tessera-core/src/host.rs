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

//! The windowing/host surface the render loop polls once per frame.

/// Host-side controls consumed by the render loop.
///
/// The loop calls [`HostControl::should_stop`] before every frame and
/// [`HostControl::poll_events`] after every present.
pub trait HostControl {
    /// Returns `true` once the session must end.
    fn should_stop(&mut self) -> bool;

    /// Current cursor position in pixels, if the host tracks one.
    fn cursor_position(&self) -> Option<(f64, f64)> {
        None
    }

    /// Pumps pending host events.
    fn poll_events(&mut self) {}
}

impl<H: HostControl + ?Sized> HostControl for Box<H> {
    fn should_stop(&mut self) -> bool {
        (**self).should_stop()
    }

    fn cursor_position(&self) -> Option<(f64, f64)> {
        (**self).cursor_position()
    }

    fn poll_events(&mut self) {
        (**self).poll_events()
    }
}
