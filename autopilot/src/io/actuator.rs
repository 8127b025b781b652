//! Input synthesis: pointer and keyboard actions.

use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::core::geometry::Coordinates;
use crate::io::config::HumanizationConfig;

/// Pointer/keyboard device owned by exactly one executor.
///
/// Calls are fire-and-forget: device faults are logged by the implementation
/// and never surface to the loop.
#[async_trait]
pub trait Actuator: Send {
    async fn move_to(&mut self, target: Coordinates);

    async fn click(&mut self);

    async fn press(&mut self, key: &str);

    async fn type_text(&mut self, text: &str);

    /// Release held devices. Called once when the loop stops.
    async fn release(&mut self) {}
}

/// Actuator that only logs what it would do.
#[derive(Debug, Default)]
pub struct DryRunActuator {
    pointer: Option<Coordinates>,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pointer(&self) -> Option<Coordinates> {
        self.pointer
    }
}

#[async_trait]
impl Actuator for DryRunActuator {
    async fn move_to(&mut self, target: Coordinates) {
        info!(%target, "dry-run: move pointer");
        self.pointer = Some(target);
    }

    async fn click(&mut self) {
        match self.pointer {
            Some(at) => info!(%at, "dry-run: click"),
            None => info!("dry-run: click"),
        }
    }

    async fn press(&mut self, key: &str) {
        info!(key, "dry-run: press");
    }

    async fn type_text(&mut self, text: &str) {
        info!(chars = text.chars().count(), "dry-run: type text");
    }
}

/// Maximum pointer offset applied when jitter is enabled, in pixels.
const JITTER_PX: i32 = 3;

/// Decorator that makes another actuator's input look less mechanical.
///
/// - pointer targets are offset by up to ±3 px (when jitter is on)
/// - pointer travel takes `mouse_speed` seconds scaled by U(0.8, 1.2)
/// - clicks are preceded, and key presses followed, by a 50–150 ms pause
pub struct HumanizedActuator<A> {
    inner: A,
    settings: HumanizationConfig,
    rng: StdRng,
}

impl<A: Actuator> HumanizedActuator<A> {
    pub fn new(inner: A, settings: HumanizationConfig) -> Self {
        Self {
            inner,
            settings,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests and replays.
    pub fn with_seed(inner: A, settings: HumanizationConfig, seed: u64) -> Self {
        Self {
            inner,
            settings,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn into_inner(self) -> A {
        self.inner
    }

    fn jittered(&mut self, target: Coordinates) -> Coordinates {
        if !self.settings.jitter {
            return target;
        }
        let dx = self.rng.gen_range(-JITTER_PX..=JITTER_PX);
        let dy = self.rng.gen_range(-JITTER_PX..=JITTER_PX);
        target.offset(dx, dy)
    }

    fn travel_time(&mut self) -> Duration {
        let scale = self.rng.gen_range(0.8..=1.2);
        Duration::from_secs_f64((self.settings.mouse_speed * scale).max(0.0))
    }

    fn short_pause(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(50..=150))
    }
}

#[async_trait]
impl<A: Actuator> Actuator for HumanizedActuator<A> {
    async fn move_to(&mut self, target: Coordinates) {
        let landed = self.jittered(target);
        let travel = self.travel_time();
        debug!(%target, %landed, travel_ms = travel.as_millis() as u64, "humanized move");
        self.inner.move_to(landed).await;
        tokio::time::sleep(travel).await;
    }

    async fn click(&mut self) {
        let pause = self.short_pause();
        tokio::time::sleep(pause).await;
        self.inner.click().await;
    }

    async fn press(&mut self, key: &str) {
        self.inner.press(key).await;
        let pause = self.short_pause();
        tokio::time::sleep(pause).await;
    }

    async fn type_text(&mut self, text: &str) {
        self.inner.type_text(text).await;
    }

    async fn release(&mut self) {
        self.inner.release().await;
    }
}
