use flow_vision::StopCheck;
use tokio::sync::watch;

/// Owner side of the junction's stop signal.
///
/// Once cancelled it stays cancelled; a fresh pair has to be created to run again.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

pub fn stop_pair() -> (StopHandle, StopToken) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopToken { rx })
}

impl StopHandle {
    pub fn cancel(&self) {
        // send_replace works with zero live receivers
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn token(&self) -> StopToken {
        StopToken { rx: self.tx.subscribe() }
    }
}

impl StopToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the handle is dropped uncancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl StopCheck for StopToken {
    fn should_stop(&self) -> bool {
        self.is_cancelled()
    }
}
