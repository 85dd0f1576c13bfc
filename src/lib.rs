use wasm_bindgen::prelude::*;
use serde::{Serialize, Deserialize};

// --- LOGGING ---
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

#[cfg(not(target_arch = "wasm32"))]
fn log(_s: &str) {}
macro_rules! console_log {
    ($($t:tt)*) => (log(&format!($($t)*)))
}


#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum Command {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
}

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum Heading {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Heading {
    fn turned_left(self) -> Heading {
        match self {
            Heading::Up => Heading::Left,
            Heading::Right => Heading::Up,
            Heading::Down => Heading::Right,
            Heading::Left => Heading::Down,
        }
    }

    fn turned_right(self) -> Heading {
        match self {
            Heading::Up => Heading::Right,
            Heading::Right => Heading::Down,
            Heading::Down => Heading::Left,
            Heading::Left => Heading::Up,
        }
    }

    // Screen coordinates: y grows downward, so Up is -y.
    fn unit(self) -> (f64, f64) {
        match self {
            Heading::Up => (0.0, -1.0),
            Heading::Right => (1.0, 0.0),
            Heading::Down => (0.0, 1.0),
            Heading::Left => (-1.0, 0.0),
        }
    }
}

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum ResizeStrategy {
    /// Start point becomes the new viewport center.
    Recenter,
    /// Start point keeps its fraction of the old viewport.
    PreserveRelative,
}

#[derive(Serialize, Clone, Copy, PartialEq, Debug)]
pub enum Phase {
    Stopped,
    Running,
    LoopDelay,
    Interrupted,
}

#[derive(Serialize, Clone, Copy, Debug)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: Heading,
    /// Accumulated rotation in degrees, decoupled from `heading` so the
    /// sprite can animate through full turns instead of snapping mod 360.
    pub rotation: f64,
}

#[derive(Serialize, Clone, Copy)]
pub struct Segment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Serialize)]
pub struct SceneState {
    pub width: f64,
    pub height: f64,
    pub step: f64,
    pub start_x: f64,
    pub start_y: f64,
    pub pose: Pose,
    pub phase: Phase,
    pub playing: bool,
    pub index: usize,
    pub cursor: usize,
    pub sequence: Vec<Command>,
    pub path: Vec<Segment>,
    pub path_locked: bool,
}

const TICK_INTERVAL_MS: f64 = 500.0;
const RESTART_DELAY_MS: f64 = 500.0;
const RESIZE_DEBOUNCE_MS: f64 = 200.0;

const STEP_SPRITE_RATIO: f64 = 0.47;
const STEP_MIN: f64 = 40.0;
const DEFAULT_SPRITE_WIDTH: f64 = 150.0;
const FALLBACK_MARGIN: f64 = 35.0;

fn step_for_sprite(sprite_width: f64) -> f64 {
    let w = if sprite_width > 0.0 { sprite_width } else { DEFAULT_SPRITE_WIDTH };
    (w * STEP_SPRITE_RATIO).max(STEP_MIN)
}

/// Replays a command list from a start point and returns the resulting pose.
/// Pure: no bounds checks and no recording, so it can be re-run in full
/// against fresh geometry after a viewport change.
fn integrate(commands: &[Command], start_x: f64, start_y: f64, step: f64) -> Pose {
    let mut pose = Pose { x: start_x, y: start_y, heading: Heading::Up, rotation: 0.0 };
    for cmd in commands {
        match cmd {
            Command::TurnLeft => {
                pose.heading = pose.heading.turned_left();
                pose.rotation -= 90.0;
            }
            Command::TurnRight => {
                pose.heading = pose.heading.turned_right();
                pose.rotation += 90.0;
            }
            Command::Forward => {
                let (dx, dy) = pose.heading.unit();
                pose.x += dx * step;
                pose.y += dy * step;
            }
            Command::Backward => {
                let (dx, dy) = pose.heading.unit();
                pose.x -= dx * step;
                pose.y -= dy * step;
            }
        }
    }
    pose
}

#[wasm_bindgen]
pub struct PathBrain {
    scene_width: f64,
    scene_height: f64,
    sprite_width: f64,

    tick_interval_ms: f64,
    restart_delay_ms: f64,
    resize_debounce_ms: f64,
    resize_strategy: ResizeStrategy,

    start_x: f64,
    start_y: f64,
    pose: Pose,

    sequence: Vec<Command>,
    cursor: usize,
    // Index of the next command to execute during playback.
    index: usize,

    // Drawn-trace record (frozen after one full loop) and the commands
    // executed since the last teleport-to-start (resize replay basis).
    path_commands: Vec<Command>,
    loop_commands: Vec<Command>,
    path_locked: bool,

    phase: Phase,
    // One countdown per timer class. At most one of tick/restart is ever
    // armed; that is what keeps the command stream single.
    tick_timer: Option<f64>,
    restart_timer: Option<f64>,
    debounce_timer: Option<f64>,
    pending_width: f64,
    pending_height: f64,
    resume_after_resize: bool,
}

#[wasm_bindgen]
impl PathBrain {
    #[wasm_bindgen(constructor)]
    pub fn new(scene_width: f64, scene_height: f64, sprite_width: f64) -> Self {
        console_log!("PathBrain ready: scene {}x{}", scene_width, scene_height);
        let start_x = scene_width / 2.0;
        let start_y = scene_height / 2.0;
        Self {
            scene_width,
            scene_height,
            sprite_width,
            tick_interval_ms: TICK_INTERVAL_MS,
            restart_delay_ms: RESTART_DELAY_MS,
            resize_debounce_ms: RESIZE_DEBOUNCE_MS,
            resize_strategy: ResizeStrategy::Recenter,
            start_x,
            start_y,
            pose: Pose { x: start_x, y: start_y, heading: Heading::Up, rotation: 0.0 },
            sequence: Vec::new(),
            cursor: 0,
            index: 0,
            path_commands: Vec::new(),
            loop_commands: Vec::new(),
            path_locked: false,
            phase: Phase::Stopped,
            tick_timer: None,
            restart_timer: None,
            debounce_timer: None,
            pending_width: scene_width,
            pending_height: scene_height,
            resume_after_resize: false,
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────

    pub fn set_sprite_width(&mut self, width: f64) {
        self.sprite_width = width.max(0.0);
    }

    pub fn set_tick_interval(&mut self, ms: f64) {
        self.tick_interval_ms = ms.max(1.0);
    }

    pub fn set_restart_delay(&mut self, ms: f64) {
        self.restart_delay_ms = ms.max(1.0);
    }

    pub fn set_resize_debounce(&mut self, ms: f64) {
        self.resize_debounce_ms = ms.max(1.0);
    }

    pub fn set_resize_strategy(&mut self, strategy: ResizeStrategy) {
        self.resize_strategy = strategy;
    }

    // ── Sequence editing ──────────────────────────────────────────────────

    pub fn add_action(&mut self, cmd: Command) {
        if self.edits_blocked() {
            return;
        }
        self.sequence.insert(self.cursor, cmd);
        self.cursor += 1;
        self.invalidate_path();
    }

    pub fn delete_at_cursor(&mut self) {
        if self.edits_blocked() || self.cursor == 0 {
            return;
        }
        self.sequence.remove(self.cursor - 1);
        self.cursor -= 1;
        self.invalidate_path();
    }

    /// Pointer hit on rendered glyph `glyph`: left half inserts before it,
    /// right half after. The result is clamped to the sequence bounds.
    pub fn place_cursor(&mut self, glyph: usize, offset_frac: f64) {
        if self.edits_blocked() {
            return;
        }
        let at = if offset_frac < 0.5 { glyph } else { glyph + 1 };
        self.cursor = at.min(self.sequence.len());
    }

    fn edits_blocked(&self) -> bool {
        self.is_playing() || self.phase == Phase::Interrupted
    }

    // Sequence changed: the previous trace no longer describes it.
    fn invalidate_path(&mut self) {
        self.path_commands.clear();
        self.loop_commands.clear();
        self.path_locked = false;
    }

    // ── Playback control ──────────────────────────────────────────────────

    pub fn play(&mut self) {
        // A pending loop restart or resize resumption still owns the
        // command stream; starting a second one would double-drive it.
        if self.is_playing() || self.phase == Phase::Interrupted || self.sequence.is_empty() {
            return;
        }
        self.path_commands.clear();
        self.loop_commands.clear();
        self.path_locked = false;
        self.index = 0;
        self.cursor = self.sequence.len();
        self.teleport_to_start();
        self.phase = Phase::Running;
        self.schedule_tick();
    }

    pub fn stop(&mut self) {
        self.cancel_playback_timers();
        self.resume_after_resize = false;
        self.phase = Phase::Stopped;
    }

    pub fn reset(&mut self) {
        self.stop();
        self.sequence.clear();
        self.path_commands.clear();
        self.loop_commands.clear();
        self.path_locked = false;
        self.index = 0;
        self.cursor = 0;
        self.teleport_to_start();
        // An armed resize debounce stays live: the viewport dimensions it
        // carries must still be applied, it just settles into Stopped now.
    }

    pub fn is_playing(&self) -> bool {
        self.tick_timer.is_some() || self.restart_timer.is_some()
    }

    fn schedule_tick(&mut self) {
        if self.tick_timer.is_some() || self.restart_timer.is_some() {
            return;
        }
        self.tick_timer = Some(self.tick_interval_ms.max(1.0));
    }

    fn cancel_playback_timers(&mut self) {
        self.tick_timer = None;
        self.restart_timer = None;
    }

    fn teleport_to_start(&mut self) {
        self.pose = Pose {
            x: self.start_x,
            y: self.start_y,
            heading: Heading::Up,
            rotation: 0.0,
        };
    }

    // ── Resize ────────────────────────────────────────────────────────────

    pub fn on_resize(&mut self, width: f64, height: f64) {
        if self.debounce_timer.is_none() {
            // First event of a burst: remember whether a run (or its loop
            // pause) was in flight, and park it.
            self.resume_after_resize = self.is_playing();
            if self.resume_after_resize {
                self.cancel_playback_timers();
                self.phase = Phase::Interrupted;
            }
        }
        self.pending_width = width;
        self.pending_height = height;
        self.debounce_timer = Some(self.resize_debounce_ms.max(1.0));
    }

    fn settle_resize(&mut self) {
        let old_width = self.scene_width;
        let old_height = self.scene_height;
        self.scene_width = self.pending_width;
        self.scene_height = self.pending_height;

        match self.resize_strategy {
            ResizeStrategy::Recenter => {
                self.start_x = self.scene_width / 2.0;
                self.start_y = self.scene_height / 2.0;
            }
            ResizeStrategy::PreserveRelative => {
                if old_width > 0.0 {
                    self.start_x = self.start_x / old_width * self.scene_width;
                }
                if old_height > 0.0 {
                    self.start_y = self.start_y / old_height * self.scene_height;
                }
            }
        }

        // Absolute positions from before the resize are useless: both the
        // start point and the step scale with geometry. Replay the commands
        // executed since the last teleport instead.
        self.pose = integrate(&self.loop_commands, self.start_x, self.start_y, self.step());
        console_log!(
            "Scene resized to {}x{}, replayed {} commands",
            self.scene_width,
            self.scene_height,
            self.loop_commands.len()
        );

        if self.resume_after_resize {
            self.resume_after_resize = false;
            self.phase = Phase::Running;
            self.schedule_tick();
        } else if self.phase == Phase::Interrupted {
            self.phase = Phase::Stopped;
        }
    }

    // ── Tick ──────────────────────────────────────────────────────────────

    /// Driven continuously by the host (rAF loop). Advances every armed
    /// countdown; a dt spanning several tick intervals executes several
    /// commands.
    pub fn tick(&mut self, dt_ms: f64) {
        if dt_ms <= 0.0 {
            return;
        }

        // Resize debounce counts down regardless of phase.
        if let Some(left) = self.debounce_timer {
            let left = left - dt_ms;
            if left > 0.0 {
                self.debounce_timer = Some(left);
            } else {
                self.debounce_timer = None;
                self.settle_resize();
                // Anything armed by the settle starts on the next call.
                return;
            }
        }

        if let Some(left) = self.restart_timer {
            let left = left - dt_ms;
            if left > 0.0 {
                self.restart_timer = Some(left);
            } else {
                self.restart_timer = None;
                self.teleport_to_start();
                self.phase = Phase::Running;
                self.schedule_tick();
            }
            return;
        }

        let mut budget = dt_ms;
        while self.phase == Phase::Running {
            let Some(left) = self.tick_timer else { break };
            if left > budget {
                self.tick_timer = Some(left - budget);
                break;
            }
            budget -= left;
            self.tick_timer = Some(self.tick_interval_ms.max(1.0));
            self.execute_step();
        }
    }

    fn execute_step(&mut self) {
        if self.index >= self.sequence.len() {
            self.finish_loop();
            return;
        }
        let cmd = self.sequence[self.index];
        self.apply_command(cmd);
        self.index += 1;
    }

    fn finish_loop(&mut self) {
        self.path_locked = true;
        self.loop_commands.clear();
        self.index = 0;
        self.tick_timer = None;
        self.restart_timer = Some(self.restart_delay_ms.max(1.0));
        self.phase = Phase::LoopDelay;
    }

    fn apply_command(&mut self, cmd: Command) {
        match cmd {
            Command::TurnLeft => {
                self.pose.heading = self.pose.heading.turned_left();
                self.pose.rotation -= 90.0;
                self.record(cmd);
            }
            Command::TurnRight => {
                self.pose.heading = self.pose.heading.turned_right();
                self.pose.rotation += 90.0;
                self.record(cmd);
            }
            Command::Forward | Command::Backward => {
                let (dx, dy) = self.pose.heading.unit();
                let sign = if matches!(cmd, Command::Forward) { 1.0 } else { -1.0 };
                let step = self.step();
                let nx = self.pose.x + dx * step * sign;
                let ny = self.pose.y + dy * step * sign;
                // A move past the scene margin does nothing and is not
                // recorded: the replayed trace only contains real motion.
                if !self.can_move(nx, ny) {
                    return;
                }
                self.pose.x = nx;
                self.pose.y = ny;
                self.record(cmd);
            }
        }
    }

    fn record(&mut self, cmd: Command) {
        if !self.path_locked {
            self.path_commands.push(cmd);
        }
        self.loop_commands.push(cmd);
    }

    fn can_move(&self, nx: f64, ny: f64) -> bool {
        let margin = if self.sprite_width > 0.0 {
            self.sprite_width / 2.0
        } else {
            FALLBACK_MARGIN
        };
        nx > margin
            && nx < self.scene_width - margin
            && ny > margin
            && ny < self.scene_height - margin
    }

    fn step(&self) -> f64 {
        step_for_sprite(self.sprite_width)
    }

    // ── Render output ─────────────────────────────────────────────────────

    // Dashed-trace input for the renderer, rebuilt from the recorded
    // commands so it is always consistent with the current geometry.
    fn path_segments(&self) -> Vec<Segment> {
        let step = self.step();
        let mut x = self.start_x;
        let mut y = self.start_y;
        let mut heading = Heading::Up;
        let mut out = Vec::with_capacity(self.path_commands.len());
        for cmd in &self.path_commands {
            match cmd {
                Command::TurnLeft => heading = heading.turned_left(),
                Command::TurnRight => heading = heading.turned_right(),
                Command::Forward | Command::Backward => {
                    let (dx, dy) = heading.unit();
                    let sign = if matches!(cmd, Command::Forward) { 1.0 } else { -1.0 };
                    let nx = x + dx * step * sign;
                    let ny = y + dy * step * sign;
                    out.push(Segment { x1: x, y1: y, x2: nx, y2: ny });
                    x = nx;
                    y = ny;
                }
            }
        }
        out
    }

    pub fn get_full_state(&self) -> JsValue {
        let state = SceneState {
            width: self.scene_width,
            height: self.scene_height,
            step: self.step(),
            start_x: self.start_x,
            start_y: self.start_y,
            pose: self.pose,
            phase: self.phase,
            playing: self.is_playing(),
            index: self.index,
            cursor: self.cursor,
            sequence: self.sequence.clone(),
            path: self.path_segments(),
            path_locked: self.path_locked,
        };
        serde_wasm_bindgen::to_value(&state).unwrap_or(JsValue::NULL)
    }
}
