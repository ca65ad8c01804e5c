//! Kinematic tabletop simulator.
//!
//! Blocks are axis-aligned cubes resting on the table at `z = 0` or on each other.
//! The gripper holds the highest block enclosing its fingertips when it closes,
//! carries it while moving and drops it when it opens. Fingertips moving below the
//! top of a block drag it along horizontally. The camera looks straight down and
//! renders the top faces.
use super::{Camera, Equipment, Frame, Manipulator, ObjectId, World};
use crate::{EnvError, WorkspaceBounds};
use anyhow::{anyhow, Result};
use log::{debug, trace};
use ndarray::{Array2, Array3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, rc::Rc};

const PALETTE: [[u8; 3]; 10] = [
    [78, 121, 167],
    [89, 161, 79],
    [156, 117, 95],
    [242, 142, 43],
    [237, 201, 72],
    [186, 176, 172],
    [255, 87, 89],
    [176, 122, 161],
    [118, 183, 178],
    [255, 157, 167],
];

const TABLE_COLOR: [u8; 3] = [48, 48, 48];

/// Configuration of [`Tabletop`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SimConfig {
    /// Blocks dropped per episode when `layout` is empty.
    pub num_objects: usize,

    /// Edge length of a block.
    pub block_size: f64,

    /// Margin between random drop points and the workspace border.
    pub drop_offset: f64,

    /// Fixed drop points. Replaces random drops if not empty.
    pub layout: Vec<[f64; 2]>,

    /// Image `[width, height]` in pixels.
    pub camera_resolution: [usize; 2],

    /// Field of view of the camera in degrees.
    pub fov: f64,

    /// Height of the camera above the table.
    pub camera_height: f64,

    /// Flange to fingertip offset.
    pub tcp: [f64; 3],

    /// Interpolation step of arm moves.
    pub move_step: f64,

    /// Reach of the fingertips around the tool center when pushing.
    pub finger_radius: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_objects: 10,
            block_size: 0.04,
            drop_offset: 0.1,
            layout: vec![],
            camera_resolution: [640, 480],
            fov: 54.7,
            camera_height: 0.8,
            tcp: [0.0, 0.0, 0.026],
            move_step: 0.005,
            finger_radius: 0.01,
        }
    }
}

impl SimConfig {
    /// Sets the number of random blocks.
    pub fn num_objects(mut self, v: usize) -> Self {
        self.num_objects = v;
        self
    }

    /// Sets fixed drop points.
    pub fn layout(mut self, v: Vec<[f64; 2]>) -> Self {
        self.layout = v;
        self
    }

    /// Sets the image size `[width, height]`.
    pub fn camera_resolution(mut self, v: [usize; 2]) -> Self {
        self.camera_resolution = v;
        self
    }

    fn validate(&self) -> Result<(), EnvError> {
        let fail = |msg: &str| Err(EnvError::InvalidWorkspace(format!("simulator: {}", msg)));
        if !(self.block_size > 0.0 && self.move_step > 0.0) {
            return fail("block size and move step must be positive");
        }
        if self.camera_resolution.iter().any(|&n| n < 2) {
            return fail("camera resolution is too small");
        }
        if !(self.fov > 0.0 && self.fov < 180.0) {
            return fail("field of view must be within (0, 180) degrees");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Block {
    id: ObjectId,
    center: [f64; 3],
    half: f64,
    color: [u8; 3],
}

impl Block {
    fn top(&self) -> f64 {
        self.center[2] + self.half
    }

    fn bottom(&self) -> f64 {
        self.center[2] - self.half
    }

    /// If `p` is over the footprint grown by `margin`.
    fn covers(&self, p: [f64; 2], margin: f64) -> bool {
        (p[0] - self.center[0]).abs() <= self.half + margin
            && (p[1] - self.center[1]).abs() <= self.half + margin
    }
}

#[derive(Debug)]
struct Gripper {
    pos: [f64; 3],
    yaw: f64,
    held: Option<ObjectId>,
}

struct Scene {
    config: SimConfig,
    workspace: WorkspaceBounds,
    blocks: Vec<Block>,
    next_id: ObjectId,
    gripper: Gripper,
    rng: StdRng,
}

impl Scene {
    fn home(&self) -> [f64; 3] {
        let [x, y] = self.workspace.center();
        [x, y, 0.3]
    }

    /// Height on which a block centered at `xy` comes to rest.
    fn rest_height(&self, xy: [f64; 2], except: Option<ObjectId>) -> f64 {
        let size = self.config.block_size;
        self.blocks
            .iter()
            .filter(|b| Some(b.id) != except)
            .filter(|b| b.covers(xy, size / 2.0))
            .map(|b| b.top())
            .fold(0.0, f64::max)
    }

    fn drop_block(&mut self, xy: [f64; 2]) {
        let half = self.config.block_size / 2.0;
        let z = self.rest_height(xy, None) + half;
        let id = self.next_id;
        self.next_id += 1;
        self.blocks.push(Block {
            id,
            center: [xy[0], xy[1], z],
            half,
            color: PALETTE[id % PALETTE.len()],
        });
        trace!("Dropped block {} at {:?}", id, [xy[0], xy[1], z]);
    }

    fn random_drop_point(&mut self) -> [f64; 2] {
        let off = self.config.drop_offset;
        let ws = self.workspace;
        let mut sample = |[lo, hi]: [f64; 2]| {
            let (lo, hi) = (lo + off, hi - off);
            if hi > lo {
                self.rng.gen_range(lo..hi)
            } else {
                (lo + hi) / 2.0
            }
        };
        [sample(ws.x), sample(ws.y)]
    }

    /// Moves the fingertips one interpolation step.
    fn advance(&mut self, to: [f64; 3]) {
        let from = self.gripper.pos;
        let shift = [to[0] - from[0], to[1] - from[1]];
        let held = self.gripper.held;
        if shift != [0.0, 0.0] {
            let r = self.config.finger_radius;
            for b in self.blocks.iter_mut().filter(|b| Some(b.id) != held) {
                if to[2] < b.top() && to[2] >= b.bottom() && b.covers([to[0], to[1]], r) {
                    b.center[0] += shift[0];
                    b.center[1] += shift[1];
                }
            }
        }
        if let Some(b) = self.blocks.iter_mut().find(|b| Some(b.id) == held) {
            b.center = to;
        }
        self.gripper.pos = to;
    }
}

/// Kinematic tabletop shared by a camera, an arm and a world handle.
#[derive(Clone)]
pub struct Tabletop {
    scene: Rc<RefCell<Scene>>,
}

impl Tabletop {
    /// Builds an empty table.
    pub fn new(config: SimConfig, workspace: WorkspaceBounds, seed: u64) -> Result<Self> {
        config.validate()?;
        workspace.validate()?;
        let [x, y] = workspace.center();
        let scene = Scene {
            config,
            workspace,
            blocks: vec![],
            next_id: 0,
            gripper: Gripper {
                pos: [x, y, 0.3],
                yaw: 0.0,
                held: None,
            },
            rng: StdRng::seed_from_u64(seed),
        };
        Ok(Self {
            scene: Rc::new(RefCell::new(scene)),
        })
    }

    /// Collaborator handles on this table.
    pub fn equipment(&self) -> Equipment {
        Equipment {
            camera: Box::new(SimCamera(self.clone())),
            manipulator: Box::new(SimArm(self.clone())),
            world: Box::new(SimWorld(self.clone())),
        }
    }

    /// Number of blocks on the table.
    pub fn num_objects(&self) -> usize {
        self.scene.borrow().blocks.len()
    }

    /// Position of the fingertips.
    pub fn gripper_position(&self) -> [f64; 3] {
        self.scene.borrow().gripper.pos
    }

    fn center_xy(&self) -> [f64; 2] {
        self.scene.borrow().workspace.center()
    }

    fn focal_length(&self) -> f64 {
        let scene = self.scene.borrow();
        let [w, h] = scene.config.camera_resolution;
        let c = (w / 2).max(h / 2) as f64;
        c / (scene.config.fov.to_radians() / 2.0).tan()
    }
}

struct SimCamera(Tabletop);

impl Camera for SimCamera {
    fn capture(&mut self) -> Result<Frame> {
        let f = self.0.focal_length();
        let [[_, _, cx], [_, _, cy], _] = self.intrinsics();
        let [tx, ty] = self.0.center_xy();
        let scene = self.0.scene.borrow();
        let [w, h] = scene.config.camera_resolution;
        let tz = scene.config.camera_height;

        let mut color = Array3::<u8>::zeros((h, w, 3));
        let mut depth = Array2::<f32>::zeros((h, w));
        for v in 0..h {
            let dy = (v as f64 - cy) / f;
            for u in 0..w {
                let dx = (u as f64 - cx) / f;
                let mut top = 0.0;
                let mut rgb = TABLE_COLOR;
                for b in scene.blocks.iter() {
                    let zc = tz - b.top();
                    if b.top() > top && zc > 0.0 && b.covers([tx + dx * zc, ty - dy * zc], 0.0) {
                        top = b.top();
                        rgb = b.color;
                    }
                }
                depth[[v, u]] = (tz - top) as f32;
                for c in 0..3 {
                    color[[v, u, c]] = rgb[c];
                }
            }
        }
        Ok(Frame { color, depth })
    }

    fn intrinsics(&self) -> [[f64; 3]; 3] {
        let f = self.0.focal_length();
        let [w, h] = self.0.scene.borrow().config.camera_resolution;
        [
            [f, 0.0, (w / 2) as f64],
            [0.0, f, (h / 2) as f64],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Straight down, image rows running against robot y.
    fn extrinsics(&self) -> [[f64; 4]; 4] {
        let [x, y] = self.0.center_xy();
        let z = self.0.scene.borrow().config.camera_height;
        [
            [1.0, 0.0, 0.0, x],
            [0.0, -1.0, 0.0, y],
            [0.0, 0.0, -1.0, z],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

struct SimArm(Tabletop);

impl Manipulator for SimArm {
    fn move_to(&mut self, pos: [f64; 3], yaw: f64) -> Result<()> {
        if pos.iter().any(|v| !v.is_finite()) || !yaw.is_finite() {
            return Err(EnvError::Actuation(format!("unreachable pose {:?}, {}", pos, yaw)).into());
        }
        let mut scene = self.0.scene.borrow_mut();
        scene.gripper.yaw = yaw;
        let from = scene.gripper.pos;
        let delta = [pos[0] - from[0], pos[1] - from[1], pos[2] - from[2]];
        let dist = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        if dist < 1e-9 {
            return Ok(());
        }

        let n = (dist / scene.config.move_step).ceil().max(1.0) as usize;
        for k in 1..=n {
            let t = k as f64 / n as f64;
            scene.advance([
                from[0] + delta[0] * t,
                from[1] + delta[1] * t,
                from[2] + delta[2] * t,
            ]);
        }
        trace!("Moved to {:?}", pos);
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        let mut scene = self.0.scene.borrow_mut();
        if let Some(id) = scene.gripper.held.take() {
            let half = scene.config.block_size / 2.0;
            if let Some(i) = scene.blocks.iter().position(|b| b.id == id) {
                let xy = [scene.blocks[i].center[0], scene.blocks[i].center[1]];
                let z = scene.rest_height(xy, Some(id)) + half;
                scene.blocks[i].center[2] = z;
            }
            debug!("Released block {}", id);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<bool> {
        let mut scene = self.0.scene.borrow_mut();
        if scene.gripper.held.is_some() {
            return Ok(false);
        }
        let p = scene.gripper.pos;
        let grasped = scene
            .blocks
            .iter()
            .filter(|b| b.covers([p[0], p[1]], 0.0) && b.bottom() <= p[2] && p[2] <= b.top())
            .max_by(|a, b| a.top().total_cmp(&b.top()))
            .map(|b| b.id);
        scene.gripper.held = grasped;
        if let Some(id) = grasped {
            debug!("Holding block {}", id);
        }
        Ok(grasped.is_none())
    }

    fn tcp(&self) -> [f64; 3] {
        self.0.scene.borrow().config.tcp
    }
}

struct SimWorld(Tabletop);

impl World for SimWorld {
    fn reset(&mut self) -> Result<()> {
        let mut scene = self.0.scene.borrow_mut();
        scene.blocks.clear();
        scene.gripper = Gripper {
            pos: scene.home(),
            yaw: 0.0,
            held: None,
        };
        Ok(())
    }

    fn add_objects(&mut self) -> Result<()> {
        let mut scene = self.0.scene.borrow_mut();
        let points = if scene.config.layout.is_empty() {
            (0..scene.config.num_objects)
                .map(|_| scene.random_drop_point())
                .collect::<Vec<_>>()
        } else {
            scene.config.layout.clone()
        };
        for xy in points {
            scene.drop_block(xy);
        }
        debug!("{} blocks on the table", scene.blocks.len());
        Ok(())
    }

    fn object_positions(&self) -> Result<Vec<(ObjectId, [f64; 3])>> {
        let scene = self.0.scene.borrow();
        Ok(scene.blocks.iter().map(|b| (b.id, b.center)).collect())
    }

    fn remove(&mut self, id: ObjectId) -> Result<()> {
        let mut scene = self.0.scene.borrow_mut();
        let i = scene
            .blocks
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| anyhow!("no object {} on the table", id))?;
        scene.blocks.remove(i);
        if scene.gripper.held == Some(id) {
            scene.gripper.held = None;
        }
        Ok(())
    }
}
