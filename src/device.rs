//! Device tags and the scoped current-device selector
//!
//! Buffers are always computed on the host; a [`Device`] is a tag that objects
//! carry so binary operations can reject operands placed on different devices.
//! The "current device" is stored in the [`Context`], not in a process global,
//! and [`ScopedDeviceSelector`] restores the previous value when it is dropped,
//! including during unwinding.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::Context;
use crate::error::{precondition, Result};

/// Kind of memory a buffer is placed in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    #[default]
    Cpu,
    CpuPinned,
    Gpu,
    Undefined,
}

/// Placement of an object's buffers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub kind: DeviceKind,
    pub id: i32,
}

impl Device {
    pub const fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            id: 0,
        }
    }

    pub const fn gpu(id: i32) -> Self {
        Self {
            kind: DeviceKind::Gpu,
            id,
        }
    }

    pub fn is_cpu(&self) -> bool {
        matches!(self.kind, DeviceKind::Cpu | DeviceKind::CpuPinned)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::CpuPinned => write!(f, "cpu-pinned"),
            DeviceKind::Gpu => write!(f, "gpu:{}", self.id),
            DeviceKind::Undefined => write!(f, "undefined"),
        }
    }
}

/// Fail with a precondition error unless both operands live on the same device
pub(crate) fn check_same_device(a: Device, b: Device) -> Result<()> {
    if a != b {
        precondition!("operands are on different devices ({} vs {})", a, b);
    }
    Ok(())
}

/// Overrides the context's current device until dropped
///
/// ```
/// use ckks_engine::{make_context, Device, ParameterPreset, ScopedDeviceSelector};
///
/// let ctx = make_context(ParameterPreset::FX).unwrap();
/// {
///     let _guard = ScopedDeviceSelector::new(&ctx, Device::gpu(0));
///     assert_eq!(ctx.current_device(), Device::gpu(0));
/// }
/// assert_eq!(ctx.current_device(), Device::cpu());
/// ```
#[must_use = "the previous device is restored as soon as the selector is dropped"]
pub struct ScopedDeviceSelector<'a> {
    context: &'a Context,
    previous: Device,
}

impl<'a> ScopedDeviceSelector<'a> {
    pub fn new(context: &'a Context, device: Device) -> Self {
        let previous = context.replace_current_device(device);
        debug!(from = %previous, to = %device, "device scope entered");
        Self { context, previous }
    }
}

impl Drop for ScopedDeviceSelector<'_> {
    fn drop(&mut self) {
        self.context.replace_current_device(self.previous);
    }
}
