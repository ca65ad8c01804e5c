//! Push-grasp manipulation environment.
use crate::{Equipment, EnvError, HeightmapProjector, VpgEnvConfig};
use anyhow::Result;
use log::{debug, info, warn};
use ndarray::{Array2, Zip};
use pushgrasp_core::{
    record::{Record, RecordValue},
    Action, Env, Primitive, Reward, State, Step,
};
use std::f64::consts::{FRAC_PI_2, PI};

/// Where the state machine stands.
///
/// Selecting an action and learning from it happen outside the environment,
/// between [`Phase::Ready`] and the next [`Phase::Perceiving`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing perceived yet, or a step failed.
    Idle,

    /// Capturing and projecting a frame.
    Perceiving,

    /// A state is available and the next action can be selected.
    Ready,

    /// Running a primitive on the manipulator.
    Executing,

    /// Perceiving the effect of a primitive.
    Measuring,

    /// The last step ended the episode. [`Env::reset`] starts the next one.
    EpisodeEnd,
}

/// Manipulation state machine clearing a workspace with push and grasp primitives.
///
/// A step executes the primitive, re-perceives the scene and compares the depth
/// heightmaps before and after. The scene counts as changed if more than
/// `pixel_thresh` cells moved by a height within `depth_thresh`, or if a grasp held
/// an object. A grasp earns `grasp_reward` on success and a push always earns
/// `push_reward`.
///
/// The episode ends when fewer than `empty_threshold` cells rise above
/// `depth_thresh[0]`, or when the push and grasp no-change counters sum to more than
/// `no_change_thresh`.
pub struct VpgEnv {
    config: VpgEnvConfig,
    projector: HeightmapProjector,
    equipment: Equipment,
    phase: Phase,
    depth_heightmap: Option<Array2<f32>>,

    /// Consecutive steps without change, `[push, grasp]`.
    no_change: [usize; 2],
}

impl VpgEnv {
    /// Runs the state machine on the given collaborators.
    pub fn with_equipment(config: VpgEnvConfig, equipment: Equipment) -> Result<Self> {
        config.validate()?;
        let projector = HeightmapProjector::new(config.workspace, config.resolution)?;
        let (rows, cols) = projector.shape();
        info!(
            "Heightmap {}x{} at {} m, {} rotations",
            rows, cols, config.resolution, config.num_rotations
        );
        Ok(Self {
            config,
            projector,
            equipment,
            phase: Phase::Idle,
            depth_heightmap: None,
            no_change: [0, 0],
        })
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// No-change counters `[push, grasp]`.
    pub fn no_change(&self) -> [usize; 2] {
        self.no_change
    }

    /// Depth heightmap of the last perception, with empty cells set to zero.
    pub fn depth_heightmap(&self) -> Option<&Array2<f32>> {
        self.depth_heightmap.as_ref()
    }

    /// Gripper angle and target position of an action.
    ///
    /// The angle is `rotation * 2π / num_rotations`. The position lies
    /// `(col, row) * resolution` from the workspace origin, at the perceived surface
    /// height of the cell.
    pub fn action_target(&self, a: &Action) -> Result<(f64, [f64; 3])> {
        let depth = self
            .depth_heightmap
            .as_ref()
            .ok_or(EnvError::NotPerceived)?;
        let (rows, cols) = depth.dim();
        let rotations = self.config.num_rotations;
        if a.rotation >= rotations || a.row >= rows || a.col >= cols {
            return Err(EnvError::InvalidAction {
                rotation: a.rotation,
                row: a.row,
                col: a.col,
                rotations,
                rows,
                cols,
            }
            .into());
        }

        let ws = &self.config.workspace;
        let res = self.config.resolution;
        let pos = [
            a.col as f64 * res + ws.x[0],
            a.row as f64 * res + ws.y[0],
            depth[[a.row, a.col]] as f64 + ws.z[0],
        ];
        Ok((a.angle(rotations), pos))
    }

    /// Captures a frame, retrying up to `capture_retries` times.
    fn perceive(&mut self) -> Result<State> {
        let camera = &mut self.equipment.camera;
        let retries = self.config.capture_retries.max(1);
        let mut frame = None;
        for attempt in 1..=retries {
            match camera.capture() {
                Ok(f) => {
                    frame = Some(f);
                    break;
                }
                Err(e) => warn!("Capture failed ({}/{}): {:#}", attempt, retries, e),
            }
        }
        let frame = frame.ok_or_else(|| {
            EnvError::Perception(format!("no frame after {} attempts", retries))
        })?;

        let (color, mut depth) = self.projector.project(
            frame.color.view(),
            frame.depth.view(),
            &camera.intrinsics(),
            &camera.extrinsics(),
        )?;
        depth.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
        let state = State::from_heightmaps(color.view(), depth.view())?;
        self.depth_heightmap = Some(depth);
        Ok(state)
    }

    /// Yaw of the gripper fingers for a heightmap angle.
    fn ortho_yaw(angle: f64) -> f64 {
        (angle % PI) - FRAC_PI_2
    }

    /// Returns `true` if an object was held.
    fn grasp(&mut self, mut pos: [f64; 3], angle: f64) -> Result<bool> {
        let c = &self.config;
        let yaw = Self::ortho_yaw(angle);
        pos[2] = (pos[2] - c.grasp_depth_offset).max(c.workspace.z[0] + c.floor_clearance);
        let above = [pos[0], pos[1], pos[2] + c.grasp_loc_margin];

        let arm = &mut self.equipment.manipulator;
        arm.move_to(above, yaw)?;
        arm.open()?;
        arm.move_to(pos, yaw)?;
        arm.close()?;
        arm.move_to(above, yaw)?;
        let success = !arm.close()?;

        if success {
            let world = &mut self.equipment.world;
            let grasped = world
                .object_positions()?
                .into_iter()
                .max_by(|a, b| a.1[2].total_cmp(&b.1[2]));
            if let Some((id, _)) = grasped {
                world.remove(id)?;
                debug!("Removed grasped object {}", id);
            }
        }
        Ok(success)
    }

    /// Pushes along the heightmap angle. Always reports success.
    fn push(&mut self, pos: [f64; 3], angle: f64) -> Result<bool> {
        let c = &self.config;
        let yaw = Self::ortho_yaw(angle);
        let arm = &mut self.equipment.manipulator;
        let tcp = arm.tcp();
        let pos = [pos[0] + tcp[0], pos[1] + tcp[1], pos[2] + tcp[2]];
        let dir = [angle.cos(), angle.sin()];
        let above = pos[2] + c.push_margin;
        let target = c.workspace.clamp_xy([
            pos[0] + dir[0] * c.push_length,
            pos[1] + dir[1] * c.push_length,
        ]);

        arm.move_to([pos[0], pos[1], above], yaw)?;
        arm.close()?;
        arm.move_to(pos, yaw)?;
        arm.move_to([target[0], target[1], pos[2]], yaw)?;
        arm.move_to([target[0], target[1], above], yaw)?;
        Ok(true)
    }

    /// Number of cells whose height changed by an amount within `depth_thresh`.
    fn change_value(&self, prev: &Array2<f32>, cur: &Array2<f32>) -> usize {
        let [lo, hi] = self.config.depth_thresh;
        Zip::from(prev)
            .and(cur)
            .fold(0, |n, &a, &b| {
                let d = (b - a).abs();
                n + (d > lo && d < hi) as usize
            })
    }

    /// Checks the termination conditions and clears the counters if the episode ended.
    fn is_episode_finished(&mut self) -> Result<bool> {
        let depth = self
            .depth_heightmap
            .as_ref()
            .ok_or(EnvError::NotPerceived)?;
        let low = self.config.depth_thresh[0];
        let occupied = depth.iter().filter(|&&v| v > low).count();
        let stuck = self.no_change.iter().sum::<usize>() > self.config.no_change_thresh;
        let done = occupied < self.config.empty_threshold || stuck;
        if done {
            info!(
                "Episode finished: {} occupied cells, no-change counters {:?}",
                occupied, self.no_change
            );
            self.no_change = [0, 0];
        }
        Ok(done)
    }

    fn step_(&mut self, a: &Action) -> Result<(Step<Self>, Record)> {
        let (angle, pos) = self.action_target(a)?;
        let prev = self
            .depth_heightmap
            .clone()
            .ok_or(EnvError::NotPerceived)?;

        self.phase = Phase::Executing;
        let (success, grasp_success) = match a.primitive {
            Primitive::Grasp => {
                let ok = self.grasp(pos, angle)?;
                (ok, ok)
            }
            Primitive::Push => (self.push(pos, angle)?, false),
        };

        self.phase = Phase::Measuring;
        let state = self.perceive()?;
        let change_value = match &self.depth_heightmap {
            Some(cur) => self.change_value(&prev, cur),
            None => 0,
        };
        let changed = change_value > self.config.pixel_thresh || grasp_success;
        let value = match a.primitive {
            Primitive::Grasp => self.config.grasp_reward * success as u8 as f32,
            Primitive::Push => self.config.push_reward * success as u8 as f32,
        };

        let counter = match a.primitive {
            Primitive::Push => &mut self.no_change[0],
            Primitive::Grasp => &mut self.no_change[1],
        };
        *counter = if changed { 0 } else { *counter + 1 };
        let no_change = self.no_change;

        info!(
            "{} at rotation {}, cell ({}, {}): change {}, reward {}",
            a.primitive, a.rotation, a.row, a.col, change_value, value
        );
        let done = self.is_episode_finished()?;
        self.phase = if done { Phase::EpisodeEnd } else { Phase::Ready };

        let mut record = Record::from_slice(&[
            ("reward", RecordValue::Scalar(value)),
            ("change_value", RecordValue::Scalar(change_value as f32)),
            ("changed", RecordValue::Scalar(changed as u8 as f32)),
            ("no_change_push", RecordValue::Scalar(no_change[0] as f32)),
            ("no_change_grasp", RecordValue::Scalar(no_change[1] as f32)),
        ]);
        if a.primitive.is_grasp() {
            record.insert("grasp_success", RecordValue::Scalar(grasp_success as u8 as f32));
        }
        if let Some(depth) = &self.depth_heightmap {
            let (rows, cols) = depth.dim();
            record.insert(
                "depth_heightmap",
                RecordValue::Array2(depth.iter().copied().collect(), [rows, cols]),
            );
        }

        let reward = Reward::new(value, changed, grasp_success);
        Ok((Step::new(state, *a, reward, done), record))
    }
}

impl Env for VpgEnv {
    type Config = VpgEnvConfig;
    type Obs = State;
    type Act = Action;

    /// Builds the collaborators named in the configuration.
    fn build(config: &Self::Config, seed: u64) -> Result<Self> {
        let equipment = config.equipment.build(&config.workspace, seed)?;
        Self::with_equipment(config.clone(), equipment)
    }

    fn step(&mut self, a: &Action) -> Result<(Step<Self>, Record)> {
        let result = self.step_(a);
        if result.is_err() {
            self.phase = Phase::Idle;
        }
        result
    }

    fn reset(&mut self) -> Result<State> {
        self.phase = Phase::Idle;
        self.no_change = [0, 0];
        self.equipment.world.reset()?;
        self.equipment.world.add_objects()?;
        self.observe()
    }

    fn observe(&mut self) -> Result<State> {
        self.phase = Phase::Perceiving;
        match self.perceive() {
            Ok(state) => {
                self.phase = Phase::Ready;
                Ok(state)
            }
            Err(e) => {
                self.phase = Phase::Idle;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        Camera, EquipmentConfig, Frame, Manipulator, ObjectId, SimConfig, Tabletop, World,
        WorkspaceBounds,
    };
    use anyhow::anyhow;
    use ndarray::Array3;

    fn center() -> [f64; 2] {
        WorkspaceBounds::default().center()
    }

    /// Cell under a point of the default workspace.
    fn cell(x: f64, y: f64) -> (usize, usize) {
        let ws = WorkspaceBounds::default();
        (
            ((y - ws.y[0]) / 0.002).round() as usize,
            ((x - ws.x[0]) / 0.002).round() as usize,
        )
    }

    fn sim_env(layout: Vec<[f64; 2]>) -> Result<(VpgEnv, Tabletop)> {
        let table = Tabletop::new(
            SimConfig::default().num_objects(layout.len()).layout(layout),
            WorkspaceBounds::default(),
            0,
        )?;
        let env = VpgEnv::with_equipment(VpgEnvConfig::default(), table.equipment())?;
        Ok((env, table))
    }

    #[test]
    fn action_target_maps_cells_to_workspace() -> Result<()> {
        let (mut env, _) = sim_env(vec![])?;
        let a = Action::new(Primitive::Push, 1, 15, 15);
        assert!(env.action_target(&a).is_err());

        env.reset()?;
        let (angle, pos) = env.action_target(&a)?;
        assert!((angle.to_degrees() - 22.5).abs() < 1e-9);
        assert!((pos[0] - (-0.724 + 0.03)).abs() < 1e-9);
        assert!((pos[1] - (-0.276 + 0.03)).abs() < 1e-9);
        assert!(pos[2].abs() < 1e-3);

        let outside = Action::new(Primitive::Grasp, 0, 250, 0);
        assert!(env.action_target(&outside).is_err());
        let bad_rotation = Action::new(Primitive::Grasp, 16, 0, 0);
        assert!(env.action_target(&bad_rotation).is_err());
        Ok(())
    }

    #[test]
    fn empty_workspace_ends_the_episode() -> Result<()> {
        let (mut env, _) = sim_env(vec![])?;
        let state = env.reset()?;
        assert_eq!(state.grid(), (250, 250));
        assert_eq!(env.phase(), Phase::Ready);

        let (step, record) = env.step(&Action::new(Primitive::Push, 0, 100, 100))?;
        assert!(step.is_done());
        assert_eq!(env.phase(), Phase::EpisodeEnd);
        assert_eq!(step.reward.value, 0.5);
        assert!(!step.reward.changed);
        assert_eq!(record.get_array2("depth_heightmap")?.1, [250, 250]);
        assert_eq!(env.no_change(), [0, 0]);
        Ok(())
    }

    #[test]
    fn stagnation_ends_the_episode() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let [x, y] = center();
        let (mut env, _) = sim_env(vec![[x, y]])?;
        env.reset()?;

        // grasps far away from the block change nothing
        let miss = Action::new(Primitive::Grasp, 0, 20, 20);
        for i in 1..=10 {
            let (step, _) = env.step(&miss)?;
            assert!(!step.is_done());
            assert!(!step.reward.changed);
            assert_eq!(step.reward.value, 0.0);
            assert_eq!(env.no_change(), [0, i]);
        }
        let (step, _) = env.step(&miss)?;
        assert!(step.is_done());
        assert_eq!(env.no_change(), [0, 0]);
        Ok(())
    }

    #[test]
    fn grasp_removes_the_held_block() -> Result<()> {
        let [x, y] = center();
        let (mut env, table) = sim_env(vec![[x, y], [x - 0.15, y + 0.1]])?;
        env.reset()?;
        let (row, col) = cell(x, y);

        let (step, record) = env.step(&Action::new(Primitive::Grasp, 4, row, col))?;
        assert!(step.reward.grasp_success);
        assert!(step.reward.changed);
        assert_eq!(step.reward.value, 1.0);
        assert_eq!(record.get_scalar("grasp_success")?, 1.0);
        assert_eq!(table.num_objects(), 1);
        assert!(!step.is_done());
        Ok(())
    }

    #[test]
    fn push_moves_the_block() -> Result<()> {
        let [x, y] = center();
        let (mut env, table) = sim_env(vec![[x, y]])?;
        env.reset()?;
        let (row, col) = cell(x - 0.04, y);

        let (step, record) = env.step(&Action::new(Primitive::Push, 0, row, col))?;
        assert!(step.reward.changed);
        assert!(!step.reward.grasp_success);
        assert_eq!(step.reward.value, 0.5);
        assert!(record.get_scalar("change_value")? > 300.0);
        assert_eq!(table.num_objects(), 1);
        Ok(())
    }

    struct BrokenCamera;

    impl Camera for BrokenCamera {
        fn capture(&mut self) -> Result<Frame> {
            Err(anyhow!("timeout"))
        }

        fn intrinsics(&self) -> [[f64; 3]; 3] {
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
        }

        fn extrinsics(&self) -> [[f64; 4]; 4] {
            [[0.0; 4]; 4]
        }
    }

    struct StuckArm;

    impl Manipulator for StuckArm {
        fn move_to(&mut self, _pos: [f64; 3], _yaw: f64) -> Result<()> {
            Err(EnvError::Actuation("joint limit".into()).into())
        }

        fn open(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<bool> {
            Ok(true)
        }

        fn tcp(&self) -> [f64; 3] {
            [0.0; 3]
        }
    }

    struct NoWorld;

    impl World for NoWorld {
        fn reset(&mut self) -> Result<()> {
            Ok(())
        }

        fn add_objects(&mut self) -> Result<()> {
            Ok(())
        }

        fn object_positions(&self) -> Result<Vec<(ObjectId, [f64; 3])>> {
            Ok(vec![])
        }

        fn remove(&mut self, _id: ObjectId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn perception_failure_surfaces_after_retries() -> Result<()> {
        let equipment = Equipment {
            camera: Box::new(BrokenCamera),
            manipulator: Box::new(StuckArm),
            world: Box::new(NoWorld),
        };
        let mut env = VpgEnv::with_equipment(VpgEnvConfig::default(), equipment)?;
        let err = env.reset().unwrap_err();
        assert!(matches!(err.downcast_ref::<EnvError>(), Some(EnvError::Perception(_))));
        assert_eq!(env.phase(), Phase::Idle);
        Ok(())
    }

    /// Flat table seen by a camera with unit focal length.
    struct FlatCamera;

    impl Camera for FlatCamera {
        fn capture(&mut self) -> Result<Frame> {
            Ok(Frame {
                color: Array3::zeros((1, 1, 3)),
                depth: Array2::from_elem((1, 1), 1.0),
            })
        }

        fn intrinsics(&self) -> [[f64; 3]; 3] {
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
        }

        fn extrinsics(&self) -> [[f64; 4]; 4] {
            let [x, y] = center();
            [
                [1.0, 0.0, 0.0, x],
                [0.0, -1.0, 0.0, y],
                [0.0, 0.0, -1.0, 1.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
        }
    }

    #[test]
    fn actuation_failure_produces_no_step() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let equipment = Equipment {
            camera: Box::new(FlatCamera),
            manipulator: Box::new(StuckArm),
            world: Box::new(NoWorld),
        };
        let mut env = VpgEnv::with_equipment(VpgEnvConfig::default(), equipment)?;
        env.reset()?;
        let err = env
            .step(&Action::new(Primitive::Push, 0, 10, 10))
            .err()
            .ok_or_else(|| anyhow!("step succeeded"))?;
        assert!(matches!(err.downcast_ref::<EnvError>(), Some(EnvError::Actuation(_))));
        assert_eq!(env.phase(), Phase::Idle);
        assert_eq!(env.no_change(), [0, 0]);

        env.observe()?;
        assert_eq!(env.phase(), Phase::Ready);
        Ok(())
    }

    #[test]
    fn builds_from_configuration() -> Result<()> {
        let config = VpgEnvConfig::default()
            .equipment(EquipmentConfig::Sim(SimConfig::default().num_objects(3)));
        let mut env = VpgEnv::build(&config, 7)?;
        let state = env.reset()?;
        assert_eq!(state.grid(), (250, 250));
        Ok(())
    }
}
