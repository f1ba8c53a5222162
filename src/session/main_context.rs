use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single-threaded UI scheduling context.
///
/// Background work never calls UI code directly; it posts closures through a [`MainHandle`]
/// and the owner of the context runs them in order on its own thread.
pub struct MainContext {
    tx: mpsc::UnboundedSender<Job>,
    rx: mpsc::UnboundedReceiver<Job>,
}

/// Cloneable sender side of a [`MainContext`].
#[derive(Clone, Debug)]
pub struct MainHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl MainHandle {
    /// Queue `f` to run on the main context. Dropped silently once the context is gone.
    pub fn post(&self, f: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(f)).is_err() {
            tracing::debug!("main context closed; dropping posted job");
        }
    }
}

impl MainContext {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn handle(&self) -> MainHandle {
        MainHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run every job already queued, without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it.
    pub async fn run_next(&mut self) {
        if let Some(job) = self.rx.recv().await {
            job();
        }
    }

    /// Run jobs, yielding to other tasks between batches, until a yield leaves the queue empty.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        loop {
            ran += self.run_pending();
            tokio::task::yield_now().await;
            if self.rx.is_empty() {
                return ran;
            }
        }
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}
