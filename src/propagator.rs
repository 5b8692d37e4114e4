//! Straight-line propagation driven by the navigator.
//!
//! The stepper advances the position by the current step size, then the
//! navigator confirms what was reached (`status`) and constrains the next
//! step (`target`). Every surface the trajectory reaches is recorded with the
//! material it carries.

use log::{debug, trace};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::ptr;

use crate::geometry::TrackingGeometry;
use crate::identifier::GeometryId;
use crate::intersection::NavigationDirection;
use crate::navigation::{NavigationStage, NavigationState};
use crate::navigator::{Navigator, NavigatorConfig};
use crate::surface::Surface;


/// Source of a step size constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    Accuracy = 0,
    Actor = 1,
    Aborter = 2,
    User = 3,
}

/// A signed step size limited independently by several sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstrainedStep {
    values: [f64; 4],
}

impl ConstrainedStep {
    /// Step with a user limit of `value`.
    pub fn new(value: f64) -> Self {
        let mut values = [f64::INFINITY; 4];
        values[ConstraintType::User as usize] = value;
        Self { values }
    }

    /// The constraint with the smallest magnitude.
    pub fn value(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .min_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(f64::INFINITY)
    }

    pub fn get(&self, kind: ConstraintType) -> f64 {
        self.values[kind as usize]
    }

    /// Sets constraint `kind`; unless `release` is set, only a tighter value is taken.
    pub fn update(&mut self, value: f64, kind: ConstraintType, release: bool) {
        let current = &mut self.values[kind as usize];
        if release || value.abs() < current.abs() {
            *current = value;
        }
    }

    pub fn release(&mut self, kind: ConstraintType) {
        self.values[kind as usize] = f64::INFINITY;
    }
}

/// What the stepper exposes to the navigator.
#[derive(Debug, Clone, PartialEq)]
pub struct StepperState {
    pub pos: Point3<f64>,
    /// Unit momentum direction.
    pub dir: Vector3<f64>,
    pub nav_dir: NavigationDirection,
    pub path_accumulated: f64,
    pub step_size: ConstrainedStep,
}

impl StepperState {
    pub fn new(pos: Point3<f64>, dir: Vector3<f64>, nav_dir: NavigationDirection, max_step_size: f64) -> Self {
        Self {
            pos,
            dir: dir.normalize(),
            nav_dir,
            path_accumulated: 0.0,
            step_size: ConstrainedStep::new(nav_dir.sign() * max_step_size),
        }
    }

    /// Direction of motion.
    pub fn direction(&self) -> Vector3<f64> {
        self.nav_dir.apply(&self.dir)
    }
}

/// Stepper and navigation state of one trajectory.
#[derive(Debug)]
pub struct PropagatorState<'g> {
    pub stepping: StepperState,
    pub navigation: NavigationState<'g>,
}

impl<'g> PropagatorState<'g> {
    pub fn new(stepping: StepperState, navigation: NavigationState<'g>) -> Self {
        Self { stepping, navigation }
    }
}

/// Propagation in the absence of a magnetic field.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLineStepper;

impl StraightLineStepper {
    /// Advances by the current step size and returns it.
    pub fn step(&self, state: &mut StepperState) -> f64 {
        let h = state.step_size.value();
        state.pos += h * state.dir;
        state.path_accumulated += h;
        h
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PropagatorOptions {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_step_size")]
    pub max_step_size: f64,
    #[serde(default)]
    pub direction: NavigationDirection,
}

fn default_max_steps() -> usize {
    1000
}

fn default_max_step_size() -> f64 {
    10_000.0
}

impl Default for PropagatorOptions {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_step_size: default_max_step_size(),
            direction: NavigationDirection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    Sensitive,
    Material,
    Passive,
    Boundary,
}

impl SurfaceKind {
    fn of(surface: &Surface) -> Self {
        if surface.geo_id().is_boundary() {
            SurfaceKind::Boundary
        } else if surface.is_sensitive() {
            SurfaceKind::Sensitive
        } else if surface.has_material() {
            SurfaceKind::Material
        } else {
            SurfaceKind::Passive
        }
    }
}

/// A surface reached by a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceHit {
    pub geo_id: GeometryId,
    pub position: Point3<f64>,
    /// Accumulated path length at the hit.
    pub path: f64,
    pub kind: SurfaceKind,
    /// Material crossed at the hit, corrected for the incidence angle.
    pub x0: f64,
    pub l0: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationOutcome {
    TargetReached,
    GeometryExhausted,
    #[default]
    MaxStepsReached,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropagationResult {
    pub hits: Vec<SurfaceHit>,
    pub path_length: f64,
    pub steps: usize,
    pub outcome: PropagationOutcome,
    pub material_in_x0: f64,
    pub material_in_l0: f64,
}

/// Runs status/target/step cycles through a geometry.
#[derive(Debug, Clone)]
pub struct Propagator<'g> {
    navigator: Navigator<'g>,
    stepper: StraightLineStepper,
}

impl<'g> Propagator<'g> {
    pub fn new(geometry: &'g TrackingGeometry, config: NavigatorConfig) -> Self {
        Self {
            navigator: Navigator::new(geometry, config),
            stepper: StraightLineStepper,
        }
    }

    pub fn navigator(&self) -> &Navigator<'g> {
        &self.navigator
    }

    /// Propagates from `start` along `direction` until the geometry is left,
    /// `target` is reached or `max_steps` steps were taken.
    pub fn propagate(
        &self,
        start: Point3<f64>,
        direction: Vector3<f64>,
        options: &PropagatorOptions,
        target: Option<&'g Surface>,
    ) -> PropagationResult {
        let stepping = StepperState::new(start, direction, options.direction, options.max_step_size);
        let navigation = NavigationState {
            target_surface: target,
            ..NavigationState::default()
        };
        let mut state = PropagatorState::new(stepping, navigation);
        let mut result = PropagationResult::default();

        self.navigator.status(&mut state);
        // the start surface is not a hit
        let mut last = state.navigation.current_surface;
        for _ in 0..options.max_steps {
            if state.navigation.stage.is_terminal() {
                break;
            }
            self.navigator.target(&mut state);
            if state.navigation.stage.is_terminal() {
                break;
            }
            self.stepper.step(&mut state.stepping);
            result.steps += 1;
            self.navigator.status(&mut state);
            record(&state, &mut last, &mut result);
        }

        result.path_length = state.stepping.path_accumulated;
        result.outcome = match state.navigation.stage {
            NavigationStage::TargetReached => PropagationOutcome::TargetReached,
            NavigationStage::GeometryExhausted => PropagationOutcome::GeometryExhausted,
            _ => PropagationOutcome::MaxStepsReached,
        };
        debug!(
            "propagation ended ({:?}) after {} steps, {} hits, {:.4} X0",
            result.outcome,
            result.steps,
            result.hits.len(),
            result.material_in_x0
        );
        result
    }
}

/// Records the current surface if `status()` has just reached a new one.
fn record<'g>(state: &PropagatorState<'g>, last: &mut Option<&'g Surface>, result: &mut PropagationResult) {
    let current = state.navigation.current_surface;
    let is_new = match (current, *last) {
        (Some(c), Some(l)) => !ptr::eq(c, l),
        (Some(_), None) => true,
        (None, _) => false,
    };
    *last = current;
    let Some(surface) = current.filter(|_| is_new) else {
        return;
    };

    let stepping = &state.stepping;
    let (x0, l0) = surface.material().map_or((0.0, 0.0), |m| {
        let cos = surface.normal(&stepping.pos).dot(&stepping.dir).abs().max(1e-6);
        let props = m.properties();
        (props.thickness_in_x0() / cos, props.thickness_in_l0() / cos)
    });
    trace!("recorded {} at path {:.4}", surface.geo_id(), stepping.path_accumulated);
    result.material_in_x0 += x0;
    result.material_in_l0 += l0;
    result.hits.push(SurfaceHit {
        geo_id: surface.geo_id(),
        position: stepping.pos,
        path: stepping.path_accumulated,
        kind: SurfaceKind::of(surface),
        x0,
        l0,
    });
}
