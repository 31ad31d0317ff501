// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-mip resource state tracking.
//!
//! wgpu inserts the actual hazard barriers itself, but the V-cycle reads and
//! writes neighboring mip levels of one texture in long alternating runs, so
//! the renderer keeps its own state machine. It serves two purposes: the
//! recorder uses it to emit [`Transition`]s only on actual state changes, and
//! the engines replay those transitions to reject any pass that touches a mip
//! level left in the wrong state.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::recording::{ImageProxy, ResourceId};
use crate::Error;

/// Access state of one mip level.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ResourceState {
    /// Not yet written this frame; contents undefined.
    Undefined,
    /// Sampled by compute or fragment shaders.
    ShaderRead,
    /// Written as a storage texture.
    StorageWrite,
    /// Written as a render pass color attachment.
    ColorTarget,
    CopySrc,
    CopyDst,
}

/// One subresource state change, part of a [`Command::Barrier`].
///
/// [`Command::Barrier`]: crate::recording::Command::Barrier
#[derive(Clone, Copy, Debug)]
pub struct Transition {
    pub image: ImageProxy,
    pub level: u32,
    pub from: ResourceState,
    pub to: ResourceState,
}

/// State of every tracked mip level.
///
/// Levels start as [`ResourceState::Undefined`] and are tracked from the first
/// [`transition`] touching them.
///
/// [`transition`]: MipStates::transition
#[derive(Clone, Default, Debug)]
pub struct MipStates {
    states: HashMap<ResourceId, SmallVec<[ResourceState; 16]>>,
}

impl MipStates {
    pub fn new() -> Self {
        Self::default()
    }

    fn levels(&mut self, image: ImageProxy) -> &mut SmallVec<[ResourceState; 16]> {
        self.states.entry(image.id).or_insert_with(|| {
            let mut levels = SmallVec::new();
            levels.resize(image.mip_levels as usize, ResourceState::Undefined);
            levels
        })
    }

    /// Records that the level is about to be accessed in the given state.
    ///
    /// Returns the [`Transition`] to emit, or [`None`] when the level is
    /// already in that state.
    pub fn transition(
        &mut self,
        image: ImageProxy,
        level: u32,
        to: ResourceState,
    ) -> Option<Transition> {
        let slot = &mut self.levels(image)[level as usize];
        let from = *slot;
        if from == to {
            return None;
        }
        *slot = to;
        Some(Transition {
            image,
            level,
            from,
            to,
        })
    }

    /// Transitions every level of the image, collecting the actual changes.
    pub fn transition_all(&mut self, image: ImageProxy, to: ResourceState) -> Vec<Transition> {
        (0..image.mip_levels)
            .filter_map(|level| self.transition(image, level, to))
            .collect()
    }

    /// Replays a recorded transition, failing if the level is not in the
    /// state the recorder believed it to be in, or if the transition would
    /// make a never-written level readable.
    pub fn apply(&mut self, transition: &Transition) -> Result<(), Error> {
        let slot = &mut self.levels(transition.image)[transition.level as usize];
        if *slot != transition.from {
            return Err(Error::WrongResourceState {
                image: transition.image.id,
                level: transition.level,
                expected: transition.from,
                found: *slot,
            });
        }
        if *slot == ResourceState::Undefined
            && matches!(
                transition.to,
                ResourceState::ShaderRead | ResourceState::CopySrc
            )
        {
            return Err(Error::ReadBeforeWrite {
                image: transition.image.id,
                level: transition.level,
            });
        }
        *slot = transition.to;
        Ok(())
    }

    /// Marks the level as already being in the given state, without emitting
    /// a transition. Used for accesses sequenced outside the command stream,
    /// such as queue uploads.
    pub fn seed(&mut self, image: ImageProxy, level: u32, state: ResourceState) {
        self.levels(image)[level as usize] = state;
    }

    /// Checks that the level is in the required state before an access.
    pub fn expect(
        &mut self,
        image: ImageProxy,
        level: u32,
        required: ResourceState,
    ) -> Result<(), Error> {
        let found = self.levels(image)[level as usize];
        if found != required {
            return Err(Error::WrongResourceState {
                image: image.id,
                level,
                expected: required,
                found,
            });
        }
        Ok(())
    }

    pub fn forget(&mut self, image: ResourceId) {
        self.states.remove(&image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::ImageFormat;

    fn image(mips: u32) -> ImageProxy {
        ImageProxy::new(64, 64, mips, ImageFormat::Rgba8)
    }

    #[test]
    fn redundant_transitions_are_elided() {
        let img = image(4);
        let mut states = MipStates::new();
        let first = states.transition(img, 2, ResourceState::StorageWrite);
        assert!(first.is_some());
        assert!(states
            .transition(img, 2, ResourceState::StorageWrite)
            .is_none());
        let back = states.transition(img, 2, ResourceState::ShaderRead).unwrap();
        assert_eq!(back.from, ResourceState::StorageWrite);
        assert_eq!(back.to, ResourceState::ShaderRead);
    }

    #[test]
    fn levels_are_tracked_independently() {
        let img = image(3);
        let mut states = MipStates::new();
        states.transition(img, 0, ResourceState::ShaderRead);
        assert!(states.expect(img, 0, ResourceState::ShaderRead).is_ok());
        assert!(states.expect(img, 1, ResourceState::Undefined).is_ok());
        assert!(states.expect(img, 1, ResourceState::ShaderRead).is_err());
    }

    #[test]
    fn apply_rejects_reads_of_unwritten_levels() {
        let img = image(2);
        let mut recorder = MipStates::new();
        let transition = recorder
            .transition(img, 1, ResourceState::ShaderRead)
            .unwrap();

        let mut replay = MipStates::new();
        let err = replay.apply(&transition).unwrap_err();
        assert!(matches!(err, Error::ReadBeforeWrite { level: 1, .. }));
    }

    #[test]
    fn apply_rejects_stale_from_state() {
        let img = image(2);
        let mut recorder = MipStates::new();
        let transition = recorder
            .transition(img, 1, ResourceState::StorageWrite)
            .unwrap();

        let mut replay = MipStates::new();
        replay.transition(img, 1, ResourceState::CopyDst);
        let err = replay.apply(&transition).unwrap_err();
        assert!(matches!(err, Error::WrongResourceState { level: 1, .. }));
    }
}
