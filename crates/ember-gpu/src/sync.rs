//! Synchronization primitives.

use crate::error::Result;
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    Ok(device.create_semaphore(&create_info, None)?)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    Ok(device.create_fence(&create_info, None)?)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    device.wait_for_fences(&[fence], true, timeout_ns)?;
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence])?;
    Ok(())
}

/// Create `count` semaphores, destroying the partial set on failure.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphores(device: &ash::Device, count: usize) -> Result<Vec<vk::Semaphore>> {
    let mut semaphores = Vec::with_capacity(count);
    for _ in 0..count {
        match create_semaphore(device) {
            Ok(s) => semaphores.push(s),
            Err(e) => {
                destroy_semaphores(device, &semaphores);
                return Err(e);
            }
        }
    }
    Ok(semaphores)
}

/// # Safety
/// The device must be valid and the semaphores unused.
pub unsafe fn destroy_semaphores(device: &ash::Device, semaphores: &[vk::Semaphore]) {
    for &semaphore in semaphores {
        device.destroy_semaphore(semaphore, None);
    }
}

/// Sequence a fenced submission so its fence cannot be left unsignaled.
///
/// `submit` must reset the fence itself, right before handing work to the
/// queue; it only runs once `record` has succeeded. If either step fails,
/// `recover` runs and must leave the fence signaled again (typically with an
/// empty submission). The first error is returned.
pub fn submit_with_fence<R, S, C>(record: R, submit: S, recover: C) -> Result<()>
where
    R: FnOnce() -> Result<()>,
    S: FnOnce() -> Result<()>,
    C: FnOnce() -> Result<()>,
{
    let result = record().and_then(|()| submit());
    if let Err(e) = result {
        if let Err(recover_err) = recover() {
            tracing::error!("Failed to re-signal fence after \"{e}\": {recover_err}");
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;
    use std::cell::RefCell;

    fn run(fail_at: Option<&'static str>) -> (Result<()>, Vec<&'static str>) {
        let log = RefCell::new(Vec::new());
        let step = |name: &'static str| {
            log.borrow_mut().push(name);
            if fail_at == Some(name) {
                Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
            } else {
                Ok(())
            }
        };
        let result = submit_with_fence(|| step("record"), || step("submit"), || step("recover"));
        (result, log.into_inner())
    }

    #[test]
    fn success_skips_recovery() {
        let (result, log) = run(None);
        assert!(result.is_ok());
        assert_eq!(log, ["record", "submit"]);
    }

    #[test]
    fn recording_failure_never_submits() {
        let (result, log) = run(Some("record"));
        assert!(result.is_err());
        assert_eq!(log, ["record", "recover"]);
    }

    #[test]
    fn submit_failure_recovers_fence() {
        let (result, log) = run(Some("submit"));
        assert!(matches!(
            result,
            Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
        ));
        assert_eq!(log, ["record", "submit", "recover"]);
    }

    #[test]
    fn recovery_failure_keeps_first_error() {
        let log = RefCell::new(Vec::new());
        let result = submit_with_fence(
            || Err(GpuError::InvalidState("record".into())),
            || {
                log.borrow_mut().push("submit");
                Ok(())
            },
            || Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST)),
        );
        assert!(matches!(result, Err(GpuError::InvalidState(_))));
        assert!(log.into_inner().is_empty());
    }
}
