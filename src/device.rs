use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Worker threads, `None` lets rayon pick one per core.
    #[serde(default)]
    pub threads: Option<usize>,
}

/// Scratch buffers are recycled by element count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScratchKey {
    pub len: usize,
}

struct DeviceInner {
    pool: ThreadPool,
    scratch: Mutex<HashMap<ScratchKey, Vec<Vec<f32>>>>,
}

/// CPU compute device. Every pass of the engine is a data-parallel loop that
/// runs to completion on this device's thread pool before the next pass starts,
/// so passes recorded one after the other never observe partial writes.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("fluid-worker-{}", i));
        if let Some(threads) = config.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;
        log::debug!("created cpu device with {} threads", pool.current_num_threads());
        Ok(Self {
            inner: Arc::new(DeviceInner {
                pool,
                scratch: Mutex::new(HashMap::new()),
            }),
        })
    }
    pub fn cpu() -> Result<Self> {
        Self::new(DeviceConfig::default())
    }
    pub fn num_threads(&self) -> usize {
        self.inner.pool.current_num_threads()
    }
    /// Runs `f` inside the device's pool; nested rayon iterators use it too.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.inner.pool.install(f)
    }
    /// Lends a zeroed scratch buffer of `len` elements for the duration of `f`.
    pub fn with_scratch<R>(&self, len: usize, f: impl FnOnce(&mut [f32]) -> R) -> R {
        let key = ScratchKey { len };
        let mut buffer = self
            .inner
            .scratch
            .lock()
            .get_mut(&key)
            .and_then(|free| free.pop())
            .unwrap_or_else(|| vec![0.0; len]);
        buffer.iter_mut().for_each(|x| *x = 0.0);
        let result = f(&mut buffer);
        self.inner.scratch.lock().entry(key).or_default().push(buffer);
        result
    }
}

/// Work size of a count-driven dispatch over the particle array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchParams {
    pub count: u32,
    pub work_size: [u32; 3],
}

impl DispatchParams {
    pub const LOCAL_SIZE: u32 = 256;
    pub fn new(count: u32) -> Self {
        Self {
            count,
            work_size: [(count + Self::LOCAL_SIZE - 1) / Self::LOCAL_SIZE, 1, 1],
        }
    }
}

pub(crate) fn profile<R>(name: &str, f: impl FnOnce() -> R) -> R {
    let t0 = std::time::Instant::now();
    let r = f();
    let elapsed = (std::time::Instant::now() - t0).as_millis();
    log::info!("[{}] finished in {}ms", name, elapsed);
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_params_round_up() {
        assert_eq!(DispatchParams::new(0).work_size, [0, 1, 1]);
        assert_eq!(DispatchParams::new(1).work_size, [1, 1, 1]);
        assert_eq!(DispatchParams::new(256).work_size, [1, 1, 1]);
        assert_eq!(DispatchParams::new(257).work_size, [2, 1, 1]);
    }

    #[test]
    fn scratch_is_zeroed_on_reuse() {
        let device = Device::new(DeviceConfig { threads: Some(2) }).unwrap();
        device.with_scratch(4, |s| s.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]));
        device.with_scratch(4, |s| assert!(s.iter().all(|x| *x == 0.0)));
        assert_eq!(device.num_threads(), 2);
    }
}
