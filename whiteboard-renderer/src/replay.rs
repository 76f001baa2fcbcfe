//! Replays command sequences onto a backend.

use whiteboard_core::DrawCommand;

use crate::backend::RenderBackend;
use crate::RenderResult;

/// Drives a [`RenderBackend`] from an ordered command sequence.
///
/// Replaying the same sequence always yields the same surface, and
/// replaying twice in a row is the same as replaying once.
pub struct ReplayEngine<B> {
    backend: B,
    frame_count: u64,
}

impl<B: RenderBackend> ReplayEngine<B> {
    /// Wrap a backend.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            frame_count: 0,
        }
    }

    /// Reset the surface and draw every command in order.
    ///
    /// # Errors
    ///
    /// Returns the first backend error; later commands are not drawn.
    pub fn replay<'a, I>(&mut self, commands: I) -> RenderResult<()>
    where
        I: IntoIterator<Item = &'a DrawCommand>,
    {
        self.backend.clear()?;
        let mut drawn = 0usize;
        for command in commands {
            self.apply(command)?;
            drawn += 1;
        }
        self.frame_count += 1;
        tracing::trace!(drawn, frame = self.frame_count, "Replayed command log");
        Ok(())
    }

    /// Draw one command on top of the current surface.
    ///
    /// # Errors
    ///
    /// Returns the backend error, if any.
    pub fn apply(&mut self, command: &DrawCommand) -> RenderResult<()> {
        if command.is_clear() {
            self.backend.clear()
        } else {
            self.backend.draw(command)
        }
    }

    /// Resize the surface and replay `commands` onto it.
    ///
    /// # Errors
    ///
    /// Returns an error if resizing or replaying fails.
    pub fn resize<'a, I>(&mut self, width: u32, height: u32, commands: I) -> RenderResult<()>
    where
        I: IntoIterator<Item = &'a DrawCommand>,
    {
        self.backend.resize(width, height)?;
        self.replay(commands)
    }

    /// Number of full replays performed.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// The wrapped backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the wrapped backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Unwrap the backend.
    #[must_use]
    pub fn into_backend(self) -> B {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::raster::RasterBackend;
    use crate::backend::recording::{RecordingBackend, RenderOp};
    use crate::RendererConfig;
    use whiteboard_core::{Color, Point, Style};

    fn line(y: f32) -> DrawCommand {
        DrawCommand::line(
            Point::new(2.0, y),
            Point::new(30.0, y),
            Style::new(3.0, Color::BLACK),
        )
        .expect("line")
    }

    fn raster() -> ReplayEngine<RasterBackend> {
        ReplayEngine::new(
            RasterBackend::new(&RendererConfig {
                width: 32,
                height: 32,
                ..RendererConfig::default()
            })
            .expect("raster"),
        )
    }

    #[test]
    fn test_replay_draws_in_order() {
        let mut engine = ReplayEngine::new(RecordingBackend::new());
        let cmds = [line(1.0), line(2.0)];
        engine.replay(&cmds).expect("replay");
        assert_eq!(
            engine.backend().ops(),
            &[
                RenderOp::Clear,
                RenderOp::Draw(line(1.0)),
                RenderOp::Draw(line(2.0))
            ]
        );
        assert_eq!(engine.frame_count(), 1);
    }

    #[test]
    fn test_clear_resets_surface() {
        let mut engine = raster();
        let cmds = [line(8.0), line(16.0), DrawCommand::clear()];
        engine.replay(&cmds).expect("replay");
        assert!(engine.backend().is_blank());

        let mut recorder = ReplayEngine::new(RecordingBackend::new());
        recorder.replay(&cmds).expect("replay");
        assert!(recorder.backend().visible().is_empty());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let cmds = [line(8.0), line(16.0)];
        let mut engine = raster();
        engine.replay(&cmds).expect("first");
        let first = engine.backend().data().to_vec();
        engine.replay(&cmds).expect("second");
        assert_eq!(engine.backend().data(), first.as_slice());
    }

    #[test]
    fn test_apply_matches_replay() {
        let cmds = [line(8.0), line(16.0)];
        let mut incremental = raster();
        incremental.replay(&cmds[..1]).expect("prefix");
        incremental.apply(&cmds[1]).expect("apply");

        let mut full = raster();
        full.replay(&cmds).expect("full");
        assert_eq!(incremental.backend().data(), full.backend().data());
    }

    #[test]
    fn test_resize_replays() {
        let mut engine = ReplayEngine::new(RecordingBackend::new());
        let cmds = [line(1.0)];
        engine.resize(10, 20, &cmds).expect("resize");
        assert_eq!(engine.backend().size(), (10, 20));
        assert_eq!(engine.backend().visible(), vec![&line(1.0)]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_command() -> impl Strategy<Value = DrawCommand> {
            prop_oneof![
                4 => (0.0f32..32.0, 0.0f32..32.0, 0.0f32..32.0, 0.0f32..32.0).prop_map(
                    |(x0, y0, x1, y1)| {
                        DrawCommand::line(
                            Point::new(x0, y0),
                            Point::new(x1, y1),
                            Style::new(2.0, Color::BLACK),
                        )
                        .expect("line")
                    }
                ),
                2 => (0.0f32..32.0, 0.0f32..32.0, 0.0f32..8.0, any::<bool>()).prop_map(
                    |(x, y, r, filled)| {
                        DrawCommand::circle(Point::new(x, y), r, filled, Style::default())
                            .expect("circle")
                    }
                ),
                1 => Just(DrawCommand::clear()),
            ]
        }

        proptest! {
            #[test]
            fn prop_replay_is_deterministic(cmds in prop::collection::vec(arb_command(), 0..16)) {
                let mut a = raster();
                let mut b = raster();
                a.replay(&cmds).expect("replay a");
                b.replay(&cmds).expect("replay b");
                b.replay(&cmds).expect("replay b again");
                prop_assert_eq!(a.backend().data(), b.backend().data());
            }
        }
    }
}
