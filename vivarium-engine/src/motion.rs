//! Motion integrator — advances points toward their targets on an
//! independent, faster-cadence loop.
//!
//! The controller keeps an in-process cache of points and a point→agent
//! owner map (both with explicit `invalidate`/`refresh`), integrates one
//! step at a time, and writes positions back only when they moved past a
//! small dead-band so near-static points do not amplify writes. Position
//! broadcasts are throttled to every Nth step.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vivarium_core::config::MotionConfig;
use vivarium_core::error::Result;
use vivarium_core::persistence::PersistenceGateway;
use vivarium_core::types::{AgentId, AgentKind, Point, PointId};
use vivarium_core::zones;

use crate::broadcast::{Broadcaster, WorldUpdate};

struct MotionInner {
    gateway: Arc<PersistenceGateway>,
    config: MotionConfig,
    broadcaster: Broadcaster,
    points: DashMap<PointId, Point>,
    owners: DashMap<PointId, AgentId>,
    time_scale: Mutex<f64>,
    steps: AtomicU64,
}

/// Shared handle over the motion state. Cloned into the motion loop and
/// into the plan phase (plan destinations overwrite wander targets
/// through [`MotionController::retarget`]).
#[derive(Clone)]
pub struct MotionController {
    inner: Arc<MotionInner>,
}

impl MotionController {
    /// Create a controller. Call [`Self::refresh`] (or let the loop do
    /// it) before stepping.
    #[must_use]
    pub fn new(
        gateway: Arc<PersistenceGateway>,
        config: MotionConfig,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(MotionInner {
                gateway,
                config,
                broadcaster,
                points: DashMap::new(),
                owners: DashMap::new(),
                time_scale: Mutex::new(1.0),
                steps: AtomicU64::new(0),
            }),
        }
    }

    /// Reload points, the point→agent owner map, and the time scale from
    /// the database.
    ///
    /// # Errors
    ///
    /// Returns persistence errors to the caller.
    pub fn refresh(&self) -> Result<()> {
        let inner = &self.inner;

        let fresh = inner.gateway.list_points()?;
        inner.points.clear();
        for point in fresh {
            inner.points.insert(point.id, point);
        }

        inner.owners.clear();
        for agent in inner.gateway.list_agents()? {
            if agent.kind == AgentKind::Agent {
                if let Some(point_id) = agent.point_id {
                    inner.owners.insert(point_id, agent.id);
                }
            }
        }

        *inner.time_scale.lock() = inner.gateway.environment()?.time_speed;
        debug!(
            points = inner.points.len(),
            owners = inner.owners.len(),
            "motion caches refreshed"
        );
        Ok(())
    }

    /// Drop the cached points and owner map. The next [`Self::refresh`]
    /// rebuilds them; steps in between are no-ops.
    pub fn invalidate(&self) {
        self.inner.points.clear();
        self.inner.owners.clear();
    }

    /// Number of cached points.
    #[must_use]
    pub fn cached_points(&self) -> usize {
        self.inner.points.len()
    }

    /// Overwrite a point's target immediately (plan-driven retarget).
    /// Takes effect on the next integration step.
    ///
    /// # Errors
    ///
    /// Returns persistence errors to the caller.
    pub fn retarget(&self, point_id: PointId, target_x: f64, target_y: f64) -> Result<()> {
        self.inner
            .gateway
            .update_point_target(point_id, target_x, target_y)?;
        if let Some(mut point) = self.inner.points.get_mut(&point_id) {
            point.target_x = target_x;
            point.target_y = target_y;
        }
        Ok(())
    }

    /// One integration step over every cached point.
    ///
    /// Points farther than the arrive radius from their target move by
    /// `min(speed × time_scale, remaining)`; arrived points pick a new
    /// wander target inside the roam bounds at a role-dependent radius.
    /// Positions are persisted only past the dead-band (or when the
    /// target changed).
    ///
    /// # Errors
    ///
    /// Returns the first persistence error encountered.
    pub fn step(&self) -> Result<()> {
        let inner = &self.inner;
        let time_scale = *inner.time_scale.lock();
        inner.steps.fetch_add(1, Ordering::Relaxed);
        let mut rng = rand::thread_rng();

        for mut entry in inner.points.iter_mut() {
            let point_id = *entry.key();
            let point = entry.value_mut();
            let old_x = point.x;
            let old_y = point.y;

            let dx = point.target_x - point.x;
            let dy = point.target_y - point.y;
            let remaining = (dx * dx + dy * dy).sqrt();

            let mut target_changed = false;
            if remaining > inner.config.arrive_radius {
                let move_distance = (point.speed * time_scale).min(remaining);
                point.x += dx / remaining * move_distance;
                point.y += dy / remaining * move_distance;
            } else {
                let radius = if inner.owners.contains_key(&point_id) {
                    inner.config.agent_wander_radius
                } else {
                    inner.config.free_wander_radius
                };
                let (tx, ty) = zones::random_target_around(point.x, point.y, radius, &mut rng);
                target_changed =
                    (tx - point.target_x).abs() > f64::EPSILON || (ty - point.target_y).abs() > f64::EPSILON;
                point.target_x = tx;
                point.target_y = ty;
            }

            let position_changed = (point.x - old_x).abs() > inner.config.write_deadband
                || (point.y - old_y).abs() > inner.config.write_deadband;
            if position_changed || target_changed {
                inner.gateway.update_point_position(
                    point_id,
                    point.x,
                    point.y,
                    point.target_x,
                    point.target_y,
                )?;
            }
        }

        Ok(())
    }

    /// Broadcast the position of every agent-owned point.
    pub fn broadcast_positions(&self) {
        for entry in self.inner.points.iter() {
            if let Some(owner) = self.inner.owners.get(entry.key()) {
                self.inner.broadcaster.publish(&WorldUpdate::AgentMoved {
                    agent_id: *owner.value(),
                    x: entry.value().x,
                    y: entry.value().y,
                });
            }
        }
    }

    /// Total integration steps taken.
    #[must_use]
    pub fn steps_taken(&self) -> u64 {
        self.inner.steps.load(Ordering::Relaxed)
    }

    fn config(&self) -> &MotionConfig {
        &self.inner.config
    }
}

/// The running motion loop.
pub struct MotionLoop {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MotionLoop {
    /// Spawn the loop at the controller's configured cadence. Must be
    /// called from within a tokio runtime.
    #[must_use]
    pub fn spawn(controller: MotionController) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            if let Err(e) = controller.refresh() {
                warn!(error = %e, "initial motion refresh failed");
            }
            let interval = Duration::from_millis(controller.config().tick_ms);
            let broadcast_stride = controller.config().broadcast_stride.max(1);
            let refresh_stride = controller.config().owner_refresh_stride.max(1);

            info!(interval_ms = controller.config().tick_ms, "motion loop started");
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    () = tokio::time::sleep(interval) => {
                        if let Err(e) = controller.step() {
                            warn!(error = %e, "motion step failed");
                        }
                        let steps = controller.steps_taken();
                        if steps % broadcast_stride == 0 {
                            controller.broadcast_positions();
                        }
                        if steps % refresh_stride == 0 {
                            if let Err(e) = controller.refresh() {
                                warn!(error = %e, "motion refresh failed");
                            }
                        }
                    }
                }
            }
            info!("motion loop stopped");
        });
        Self { stop_tx, task }
    }

    /// Stop the loop and await its termination.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use vivarium_core::types::distance;

    fn controller() -> MotionController {
        let gateway = Arc::new(PersistenceGateway::open_in_memory().expect("open"));
        MotionController::new(gateway, MotionConfig::default(), Broadcaster::new())
    }

    fn insert_point(ctrl: &MotionController, x: f64, y: f64, tx: f64, ty: f64, speed: f64) -> PointId {
        let point = Point {
            id: PointId::new(),
            x,
            y,
            target_x: tx,
            target_y: ty,
            speed,
        };
        ctrl.inner.gateway.insert_point(&point).expect("insert");
        ctrl.refresh().expect("refresh");
        point.id
    }

    #[test]
    fn moves_exactly_speed_per_step_and_arrives() {
        // Speed 0.3, straight-line distance 10, time scale 1.
        let ctrl = controller();
        let id = insert_point(&ctrl, 40.0, 50.0, 50.0, 50.0, 0.3);

        ctrl.step().expect("step");
        let point = *ctrl.inner.points.get(&id).expect("cached");
        assert!((point.x - 40.3).abs() < 1e-9, "moved {}", point.x - 40.0);
        assert!((point.y - 50.0).abs() < 1e-9);

        // Within ceil(10 / 0.3) steps the point is inside the dead-band
        // of its target.
        let mut steps = 1;
        while ctrl
            .inner
            .points
            .get(&id)
            .map(|p| p.distance_to_target())
            .expect("cached")
            > 0.5
        {
            ctrl.step().expect("step");
            steps += 1;
            assert!(steps <= 34, "did not arrive in ceil(10/0.3) steps");
        }
    }

    #[test]
    fn overshoot_is_clamped_to_remaining_distance() {
        let ctrl = controller();
        let id = insert_point(&ctrl, 50.0, 50.0, 50.0, 51.0, 5.0);

        ctrl.step().expect("step");
        let point = *ctrl.inner.points.get(&id).expect("cached");
        assert!((point.y - 51.0).abs() < 1e-9, "must stop at the target");
    }

    #[test]
    fn arrived_point_gets_a_fresh_target_inside_roam_bounds() {
        let ctrl = controller();
        let id = insert_point(&ctrl, 50.0, 50.0, 50.0, 50.0, 1.5);

        for _ in 0..50 {
            ctrl.step().expect("step");
            let point = *ctrl.inner.points.get(&id).expect("cached");
            assert!(
                zones::in_roam_bounds(point.target_x, point.target_y),
                "wander target escaped the roam bounds"
            );
            assert!(zones::in_roam_bounds(point.x, point.y) || distance((point.x, point.y), (50.0, 50.0)) < 10.0);
        }
    }

    #[test]
    fn small_moves_are_not_persisted() {
        let ctrl = controller();
        // Distance to target 0.6: one step of 0.05 stays under the 0.1
        // dead-band on both axes.
        let id = insert_point(&ctrl, 50.0, 50.0, 50.6, 50.0, 0.05);

        ctrl.step().expect("step");
        let stored = ctrl.inner.gateway.get_point(id).expect("get").expect("Some");
        assert!((stored.x - 50.0).abs() < f64::EPSILON, "dead-band write leaked");

        // The cache still advanced.
        let cached = *ctrl.inner.points.get(&id).expect("cached");
        assert!(cached.x > 50.0);
    }

    #[test]
    fn retarget_overrides_wander_immediately() {
        let ctrl = controller();
        let id = insert_point(&ctrl, 50.0, 50.0, 40.0, 50.0, 1.0);

        ctrl.retarget(id, 60.0, 55.0).expect("retarget");
        let cached = *ctrl.inner.points.get(&id).expect("cached");
        assert!((cached.target_x - 60.0).abs() < f64::EPSILON);

        ctrl.step().expect("step");
        let cached = *ctrl.inner.points.get(&id).expect("cached");
        assert!(cached.x > 50.0, "moving toward the new target");
    }

    #[test]
    fn invalidate_then_refresh_round_trips() {
        let ctrl = controller();
        insert_point(&ctrl, 50.0, 50.0, 50.0, 50.0, 1.0);
        assert_eq!(ctrl.cached_points(), 1);

        ctrl.invalidate();
        assert_eq!(ctrl.cached_points(), 0);
        ctrl.step().expect("step is a no-op while invalidated");

        ctrl.refresh().expect("refresh");
        assert_eq!(ctrl.cached_points(), 1);
    }

    #[tokio::test]
    async fn loop_starts_and_stops_cleanly() {
        let ctrl = controller();
        insert_point(&ctrl, 50.0, 50.0, 55.0, 50.0, 1.0);

        let handle = MotionLoop::spawn(ctrl.clone());
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop().await;

        assert!(ctrl.steps_taken() > 0, "the loop should have stepped");
    }
}
