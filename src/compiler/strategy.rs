//! Render strategies
//!
//! One strategy object per evaluation mode. The code generator consults it
//! when emitting buffers and suspension points, so a single node can be
//! compiled for any mode without mode checks of its own.

use crate::runtime::buffer::SinkKind;

pub trait RenderStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Kind of buffer guarded regions and the root output use
    fn sink(&self) -> SinkKind;

    /// Whether value-producing expressions get an `Await` suspension point
    fn suspends(&self) -> bool;
}

/// Straight-line text rendering
pub struct SyncStrategy;

impl RenderStrategy for SyncStrategy {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn sink(&self) -> SinkKind {
        SinkKind::Text
    }

    fn suspends(&self) -> bool {
        false
    }
}

/// Text rendering where any value may need to be awaited
pub struct AsyncStrategy;

impl RenderStrategy for AsyncStrategy {
    fn name(&self) -> &'static str {
        "async"
    }

    fn sink(&self) -> SinkKind {
        SinkKind::Text
    }

    fn suspends(&self) -> bool {
        true
    }
}

/// Rendering into typed fragments instead of text
pub struct NativeStrategy {
    pub suspends: bool,
}

impl RenderStrategy for NativeStrategy {
    fn name(&self) -> &'static str {
        if self.suspends {
            "native-async"
        } else {
            "native"
        }
    }

    fn sink(&self) -> SinkKind {
        SinkKind::Fragments
    }

    fn suspends(&self) -> bool {
        self.suspends
    }
}

pub static SYNC: SyncStrategy = SyncStrategy;
pub static ASYNC: AsyncStrategy = AsyncStrategy;
pub static NATIVE: NativeStrategy = NativeStrategy { suspends: false };
pub static NATIVE_ASYNC: NativeStrategy = NativeStrategy { suspends: true };
