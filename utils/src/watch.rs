use crossbeam::channel::{Receiver, bounded};
use memscope_runtime::memory::{Address, AddressSpace};
use rand::RngCore;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{JoinHandle, spawn},
    time::Duration,
};

const FRAME_TIME: Duration = Duration::from_millis(16);

/// Stand-in for an emulator core that scribbles over a window of memory every frame
pub struct SimulatedCore {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    frames: Receiver<u64>,
}

impl SimulatedCore {
    /// Start writing `length` bytes at `address` each frame
    ///
    /// The first word of the window holds a frame counter, the rest is noise
    pub fn spawn(address_space: Arc<AddressSpace>, address: Address, length: u32) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let (sender, frames) = bounded(1);

        let thread = spawn({
            let running = running.clone();

            move || {
                let mut rng = rand::rng();
                let mut buffer = vec![0; length as usize];

                while running.load(Ordering::Relaxed) {
                    let tick = address_space.current_tick();

                    rng.fill_bytes(&mut buffer);
                    let counter = (tick as u32).to_le_bytes();
                    let counter_length = counter.len().min(buffer.len());
                    buffer[..counter_length].copy_from_slice(&counter[..counter_length]);

                    if let Err(error) = address_space.write(address, &buffer) {
                        tracing::error!("Simulated core stopped: {}", error);
                        break;
                    }

                    let tick = address_space.advance_tick();

                    // The inspector only needs the most recent frame
                    let _ = sender.try_send(tick);

                    std::thread::sleep(FRAME_TIME);
                }
            }
        });

        Self {
            running,
            thread: Some(thread),
            frames,
        }
    }

    /// Block until the core finishes another frame
    pub fn next_frame(&self) -> Option<u64> {
        self.frames.recv_timeout(FRAME_TIME * 8).ok()
    }
}

impl Drop for SimulatedCore {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
