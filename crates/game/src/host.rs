use saveex::{GameState, SaveHost, Snapshot};
use tracing::debug;

/// Stand-in host: a synthesized framebuffer and a mutable game snapshot.
/// A real deployment implements `SaveHost` over the engine's render surface
/// and live state instead.
pub(crate) struct DemoHost {
    state: GameState,
    frame_width: u32,
    frame_height: u32,
}

impl DemoHost {
    pub(crate) fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            state: GameState {
                map_id: 1,
                map_display_name: "Verdant Pass".to_string(),
                party: vec!["Mina".to_string(), "Joren".to_string()],
                playtime_seconds: 0,
                events: Vec::new(),
            },
            frame_width,
            frame_height,
        }
    }

    pub(crate) fn advance_playtime(&mut self, seconds: u64) {
        self.state.playtime_seconds += seconds;
    }

    pub(crate) fn enter_map(&mut self, map_id: u32, display_name: &str) {
        self.state.map_id = map_id;
        self.state.map_display_name = display_name.to_string();
    }
}

impl SaveHost for DemoHost {
    fn frame(&self) -> Option<Snapshot> {
        let mut rgba =
            Vec::with_capacity(self.frame_width as usize * self.frame_height as usize * 4);
        for y in 0..self.frame_height {
            for x in 0..self.frame_width {
                rgba.extend_from_slice(&[
                    (x * 255 / self.frame_width.max(1)) as u8,
                    (y * 255 / self.frame_height.max(1)) as u8,
                    96,
                    255,
                ]);
            }
        }
        Snapshot::new(self.frame_width, self.frame_height, rgba).ok()
    }

    fn before_save(&mut self) {
        debug!(map_id = self.state.map_id, "before_save_hook");
    }

    fn state(&self) -> &GameState {
        &self.state
    }
}
