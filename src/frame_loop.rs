// The overlay's control loop.
//
// Each iteration either dispatches one pending message or samples the target
// window and acts on it:
//   • target unfocused: hide the overlay, exit if the target is gone, otherwise
//     hand the callback an idle tick and wait (bounded) for the next message
//   • target focused: re-place the overlay and rebuild the surface binding when
//     anything changed, then draw and present one vsync'd frame
//
// There is no cached "last known good" state. Visibility and geometry come
// from the platform every iteration; the surface is only ever resized here.

use crate::error::RuntimeError;
use crate::geometry::Rect;
use log::{debug, info, warn};
use std::time::Duration;

/// Result of a non-blocking poll of the message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    Dispatched,
    Quit,
    Empty,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    TargetClosed,
    QuitMessage,
    /// The overlay had already been cleaned up, so the loop never ran.
    CleanedUp,
}

/// Read-only view of the foreign window being overlaid. Every query must be
/// safe on a handle owned by another process.
pub trait TargetWindow {
    /// Screen rectangle, `None` when it can't be read (window gone).
    fn rect(&self) -> Option<Rect>;
    fn is_foreground(&self) -> bool;
    fn exists(&self) -> bool;
    fn is_visible(&self) -> bool;
}

/// Everything the loop needs from the overlay window and its render pipeline.
pub trait Backend {
    /// Drawing handle the render callback receives for a focused frame.
    type Ui;

    fn pump_message(&mut self) -> Pump;

    fn overlay_visible(&self) -> bool;
    fn overlay_rect(&self) -> Option<Rect>;
    fn hide_overlay(&mut self);
    /// Move/resize the overlay to `rect`, topmost and shown.
    fn place_overlay(&mut self, rect: Rect);

    fn has_view(&self) -> bool;
    /// Drop the back-buffer view. Safe when none is held.
    fn release_view(&mut self);
    /// Resize the surface buffers in place. No view may be held.
    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), RuntimeError>;
    fn create_view(&mut self) -> Result<(), RuntimeError>;

    /// Begin a GUI frame of `size`, let `draw` build it, and finalize its
    /// draw data.
    fn build_frame(&mut self, size: (u32, u32), draw: &mut dyn FnMut(&Self::Ui));
    fn bind_view(&mut self) -> Result<(), RuntimeError>;
    /// Submit the finalized draw data to the bound view.
    fn render(&mut self) -> Result<(), RuntimeError>;
    /// Present synchronized to one vertical refresh.
    fn present(&mut self) -> Result<(), RuntimeError>;

    /// Wait up to `timeout`, returning early when a message arrives.
    fn idle(&mut self, timeout: Duration);
}

#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Bounded wait after each unfocused tick or dropped frame.
    pub idle_wait: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_millis(100),
        }
    }
}

/// Outcome of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Exit(LoopExit),
}

#[derive(Debug, Default)]
pub struct FrameLoop {
    options: LoopOptions,
}

impl FrameLoop {
    pub fn new(options: LoopOptions) -> Self {
        Self { options }
    }

    /// Runs until the target disappears or a quit message arrives. The view is
    /// released before returning.
    pub fn run<B, T, F>(&mut self, backend: &mut B, target: &T, mut callback: F) -> LoopExit
    where
        B: Backend + ?Sized,
        T: TargetWindow + ?Sized,
        F: FnMut(bool, Rect, Option<&B::Ui>),
    {
        loop {
            if let Step::Exit(exit) = self.step(backend, target, &mut callback) {
                return exit;
            }
        }
    }

    pub fn step<B, T, F>(&mut self, backend: &mut B, target: &T, callback: &mut F) -> Step
    where
        B: Backend + ?Sized,
        T: TargetWindow + ?Sized,
        F: FnMut(bool, Rect, Option<&B::Ui>),
    {
        match backend.pump_message() {
            Pump::Dispatched => return Step::Continue,
            Pump::Quit => return Self::terminate(backend, LoopExit::QuitMessage),
            Pump::Empty => {}
        }

        let overlay_visible = backend.overlay_visible();
        let overlay_rect = backend.overlay_rect();
        let target_rect = target.rect();
        let target_focused = target_rect.is_some() && target.is_foreground();

        let target_rect = match target_rect {
            Some(rect) if target_focused => rect,
            _ => {
                if overlay_visible {
                    backend.hide_overlay();
                }
                if target_rect.is_none() || !target.exists() {
                    return Self::terminate(backend, LoopExit::TargetClosed);
                }
                callback(false, target_rect.unwrap_or_default(), None);
                self.idle(backend);
                return Step::Continue;
            }
        };

        if !overlay_visible || overlay_rect != Some(target_rect) || !backend.has_view() {
            if let Err(e) = Self::rebind(backend, target_rect) {
                warn!("Dropping frame, surface rebind failed: {}", e);
                self.idle(backend);
                return Step::Continue;
            }
        }

        backend.build_frame(target_rect.surface_size(), &mut |ui: &B::Ui| {
            callback(true, target_rect, Some(ui))
        });

        if let Err(e) = backend.bind_view() {
            warn!("Dropping frame: {}", e);
            return Step::Continue;
        }
        if let Err(e) = backend.render() {
            warn!("Dropping frame: {}", e);
            return Step::Continue;
        }
        if let Err(e) = backend.present() {
            warn!("{}", e);
        }
        Step::Continue
    }

    /// Match the overlay to the target and rebuild the back-buffer view.
    /// No frame is drawn between the release and the recreate.
    fn rebind<B: Backend + ?Sized>(backend: &mut B, rect: Rect) -> Result<(), RuntimeError> {
        backend.place_overlay(rect);
        backend.release_view();
        let (width, height) = rect.surface_size();
        backend.resize_surface(width, height)?;
        backend.create_view()?;
        debug!(
            "Overlay synced to ({}, {}) {}x{}",
            rect.left, rect.top, width, height
        );
        Ok(())
    }

    fn idle<B: Backend + ?Sized>(&self, backend: &mut B) {
        if !self.options.idle_wait.is_zero() {
            backend.idle(self.options.idle_wait);
        }
    }

    fn terminate<B: Backend + ?Sized>(backend: &mut B, exit: LoopExit) -> Step {
        backend.release_view();
        info!("Frame loop exiting: {:?}", exit);
        Step::Exit(exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Hide,
        Place(Rect),
        Release,
        Resize(u32, u32),
        Create,
        Frame(u32, u32),
        Bind,
        Render(usize),
        Present,
        Idle(Duration),
    }

    /// Stand-in drawing handle; counts the primitives a callback adds.
    struct FakeUi {
        size: (u32, u32),
        primitives: Cell<usize>,
    }

    impl FakeUi {
        fn add_rect(&self) {
            self.primitives.set(self.primitives.get() + 1);
        }
    }

    #[derive(Default)]
    struct MockBackend {
        pumps: VecDeque<Pump>,
        visible: bool,
        rect: Option<Rect>,
        view: bool,
        fail_resize: u32,
        fail_create: u32,
        draw_data: Option<usize>,
        calls: Vec<Call>,
        violations: Vec<&'static str>,
    }

    impl MockBackend {
        fn count(&self, wanted: fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| wanted(c)).count()
        }
    }

    impl Backend for MockBackend {
        type Ui = FakeUi;

        fn pump_message(&mut self) -> Pump {
            self.pumps.pop_front().unwrap_or(Pump::Empty)
        }
        fn overlay_visible(&self) -> bool {
            self.visible
        }
        fn overlay_rect(&self) -> Option<Rect> {
            self.rect
        }
        fn hide_overlay(&mut self) {
            self.visible = false;
            self.calls.push(Call::Hide);
        }
        fn place_overlay(&mut self, rect: Rect) {
            self.visible = true;
            self.rect = Some(rect);
            self.calls.push(Call::Place(rect));
        }
        fn has_view(&self) -> bool {
            self.view
        }
        fn release_view(&mut self) {
            self.view = false;
            self.calls.push(Call::Release);
        }
        fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), RuntimeError> {
            if self.view {
                self.violations.push("resize with a live view");
            }
            self.calls.push(Call::Resize(width, height));
            if self.fail_resize > 0 {
                self.fail_resize -= 1;
                return Err(RuntimeError::SurfaceResizeFailed {
                    width,
                    height,
                    source: PlatformError::new(-1, "device removed"),
                });
            }
            Ok(())
        }
        fn create_view(&mut self) -> Result<(), RuntimeError> {
            if self.view {
                self.violations.push("create while a view is held");
            }
            self.calls.push(Call::Create);
            if self.fail_create > 0 {
                self.fail_create -= 1;
                return Err(RuntimeError::BackBufferUnavailable(PlatformError::new(-1, "lost")));
            }
            self.view = true;
            Ok(())
        }
        fn build_frame(&mut self, size: (u32, u32), draw: &mut dyn FnMut(&FakeUi)) {
            self.calls.push(Call::Frame(size.0, size.1));
            let ui = FakeUi {
                size,
                primitives: Cell::new(0),
            };
            draw(&ui);
            self.draw_data = Some(ui.primitives.get());
        }
        fn bind_view(&mut self) -> Result<(), RuntimeError> {
            if !self.view {
                self.violations.push("bind without a view");
            }
            self.calls.push(Call::Bind);
            Ok(())
        }
        fn render(&mut self) -> Result<(), RuntimeError> {
            match self.draw_data.take() {
                Some(primitives) => self.calls.push(Call::Render(primitives)),
                None => self.violations.push("render without finalized draw data"),
            }
            Ok(())
        }
        fn present(&mut self) -> Result<(), RuntimeError> {
            self.calls.push(Call::Present);
            Ok(())
        }
        fn idle(&mut self, timeout: Duration) {
            self.calls.push(Call::Idle(timeout));
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct TargetState {
        rect: Option<Rect>,
        foreground: bool,
        exists: bool,
    }

    fn focused(rect: Rect) -> TargetState {
        TargetState {
            rect: Some(rect),
            foreground: true,
            exists: true,
        }
    }

    fn unfocused(rect: Rect) -> TargetState {
        TargetState {
            rect: Some(rect),
            foreground: false,
            exists: true,
        }
    }

    fn gone() -> TargetState {
        TargetState {
            rect: None,
            foreground: false,
            exists: false,
        }
    }

    /// `rect()` is the first target query of every sample, so it advances the
    /// script. The last state sticks once the script runs out.
    struct MockTarget {
        script: RefCell<VecDeque<TargetState>>,
        current: Cell<TargetState>,
    }

    impl MockTarget {
        fn new(states: Vec<TargetState>) -> Self {
            Self {
                script: RefCell::new(states.into()),
                current: Cell::new(gone()),
            }
        }
    }

    impl TargetWindow for MockTarget {
        fn rect(&self) -> Option<Rect> {
            if let Some(next) = self.script.borrow_mut().pop_front() {
                self.current.set(next);
            }
            self.current.get().rect
        }
        fn is_foreground(&self) -> bool {
            self.current.get().foreground
        }
        fn exists(&self) -> bool {
            self.current.get().exists
        }
        fn is_visible(&self) -> bool {
            self.current.get().exists
        }
    }

    type Seen = Vec<(bool, Rect, Option<(u32, u32)>)>;

    fn run_script(backend: &mut MockBackend, states: Vec<TargetState>) -> (LoopExit, Seen) {
        let target = MockTarget::new(states);
        let mut seen = Vec::new();
        let mut frame_loop = FrameLoop::new(LoopOptions {
            idle_wait: Duration::from_millis(100),
        });
        let exit = frame_loop.run(backend, &target, |focused, rect, ui| {
            seen.push((focused, rect, ui.map(|ui| ui.size)));
            if let Some(ui) = ui {
                ui.add_rect();
            }
        });
        (exit, seen)
    }

    const R: Rect = Rect::new(0, 0, 800, 600);

    #[test]
    fn first_focused_frame_syncs_then_presents() {
        let mut backend = MockBackend::default();
        let (exit, seen) = run_script(&mut backend, vec![focused(R), gone()]);

        assert_eq!(exit, LoopExit::TargetClosed);
        assert_eq!(seen, vec![(true, R, Some((800, 600)))]);
        assert_eq!(
            backend.calls,
            vec![
                Call::Place(R),
                Call::Release,
                Call::Resize(800, 600),
                Call::Create,
                Call::Frame(800, 600),
                Call::Bind,
                Call::Render(1),
                Call::Present,
                Call::Hide,
                Call::Release,
            ]
        );
        assert!(backend.violations.is_empty());
    }

    #[test]
    fn losing_focus_hides_without_resizing_or_presenting() {
        let moved = Rect::new(50, 50, 1330, 770);
        let mut backend = MockBackend::default();
        let (_, seen) = run_script(
            &mut backend,
            vec![focused(R), unfocused(moved), unfocused(moved), gone()],
        );

        assert_eq!(seen[1], (false, moved, None));
        assert_eq!(seen[2], (false, moved, None));
        let after_first = backend
            .calls
            .iter()
            .position(|c| *c == Call::Present)
            .unwrap();
        let rest = &backend.calls[after_first + 1..];
        assert_eq!(
            rest,
            &[
                Call::Hide,
                Call::Idle(Duration::from_millis(100)),
                Call::Idle(Duration::from_millis(100)),
                Call::Release,
            ]
        );
        // Still sized to the last focused rectangle.
        assert_eq!(backend.rect, Some(R));
        assert!(!backend.visible);
    }

    #[test]
    fn unchanged_rect_does_not_rebind() {
        let mut backend = MockBackend::default();
        run_script(&mut backend, vec![focused(R), focused(R), focused(R), gone()]);

        assert_eq!(backend.count(|c| matches!(c, Call::Resize(..))), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::Create)), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::Present)), 3);
    }

    #[test]
    fn position_change_alone_triggers_rebind() {
        let moved = Rect::new(10, 20, 810, 620);
        let mut backend = MockBackend::default();
        run_script(&mut backend, vec![focused(R), focused(moved), gone()]);

        let resizes: Vec<_> = backend
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Resize(..)))
            .cloned()
            .collect();
        assert_eq!(resizes, vec![Call::Resize(800, 600), Call::Resize(800, 600)]);
        assert_eq!(backend.rect, Some(moved));
    }

    #[test]
    fn view_is_never_held_across_a_resize() {
        let rects = [
            R,
            Rect::new(0, 0, 1024, 768),
            Rect::new(-8, -8, 1928, 1088),
            Rect::new(300, 200, 301, 201),
            Rect::new(300, 200, 300, 200),
            R,
        ];
        let mut states: Vec<_> = rects.iter().copied().map(focused).collect();
        states.insert(3, unfocused(R));
        states.push(gone());

        let mut backend = MockBackend::default();
        let (_, seen) = run_script(&mut backend, states);

        assert!(backend.violations.is_empty(), "{:?}", backend.violations);
        for (i, call) in backend.calls.iter().enumerate() {
            if matches!(call, Call::Resize(..)) {
                assert_eq!(backend.calls[i - 1], Call::Release);
                assert_eq!(backend.calls[i + 1], Call::Create);
            }
        }
        assert!(backend.calls.contains(&Call::Resize(1, 1)));
        assert_eq!(seen.last().map(|s| s.1), Some(R));
    }

    #[test]
    fn externally_hidden_overlay_is_shown_again() {
        let mut backend = MockBackend::default();
        let target = MockTarget::new(vec![focused(R), focused(R), gone()]);
        let mut frame_loop = FrameLoop::new(LoopOptions::default());
        let mut cb = |_: bool, _: Rect, _: Option<&FakeUi>| {};

        assert_eq!(frame_loop.step(&mut backend, &target, &mut cb), Step::Continue);
        backend.visible = false;
        assert_eq!(frame_loop.step(&mut backend, &target, &mut cb), Step::Continue);

        assert_eq!(backend.count(|c| matches!(c, Call::Place(_))), 2);
        assert!(backend.visible);
    }

    #[test]
    fn pending_messages_are_drained_before_rendering() {
        let mut backend = MockBackend {
            pumps: VecDeque::from(vec![Pump::Dispatched, Pump::Dispatched, Pump::Dispatched]),
            ..Default::default()
        };
        let target = MockTarget::new(vec![focused(R), gone()]);
        let mut frame_loop = FrameLoop::new(LoopOptions::default());
        let mut invoked = 0;
        let mut cb = |_: bool, _: Rect, _: Option<&FakeUi>| invoked += 1;

        for _ in 0..3 {
            assert_eq!(frame_loop.step(&mut backend, &target, &mut cb), Step::Continue);
        }
        assert!(backend.calls.is_empty());
        assert_eq!(frame_loop.step(&mut backend, &target, &mut cb), Step::Continue);
        assert_eq!(backend.calls.last(), Some(&Call::Present));
        assert_eq!(invoked, 1);
    }

    #[test]
    fn quit_message_terminates_and_releases_view() {
        let mut backend = MockBackend {
            pumps: VecDeque::from(vec![Pump::Empty, Pump::Dispatched, Pump::Quit]),
            ..Default::default()
        };
        let (exit, seen) = run_script(&mut backend, vec![focused(R)]);

        assert_eq!(exit, LoopExit::QuitMessage);
        assert_eq!(seen.len(), 1);
        assert_eq!(backend.calls.last(), Some(&Call::Release));
        assert!(!backend.view);
    }

    #[test]
    fn target_closed_while_unfocused_releases_exactly_once() {
        let mut backend = MockBackend::default();
        let (exit, seen) = run_script(&mut backend, vec![focused(R), unfocused(R), gone()]);

        assert_eq!(exit, LoopExit::TargetClosed);
        assert_eq!(seen.len(), 2);
        let last_present = backend
            .calls
            .iter()
            .rposition(|c| *c == Call::Present)
            .unwrap();
        let trailing_releases = backend.calls[last_present..]
            .iter()
            .filter(|c| **c == Call::Release)
            .count();
        assert_eq!(trailing_releases, 1);
        assert_eq!(backend.calls.last(), Some(&Call::Release));
    }

    #[test]
    fn existing_but_unreadable_target_also_terminates() {
        let mut backend = MockBackend::default();
        let unreadable = TargetState {
            rect: None,
            foreground: true,
            exists: true,
        };
        let (exit, seen) = run_script(&mut backend, vec![unreadable]);
        assert_eq!(exit, LoopExit::TargetClosed);
        assert!(seen.is_empty());
    }

    #[test]
    fn failed_view_drops_frame_and_retries() {
        let mut backend = MockBackend {
            fail_create: 1,
            ..Default::default()
        };
        let (_, seen) = run_script(&mut backend, vec![focused(R), focused(R), gone()]);

        // Only the second iteration reached the callback.
        assert_eq!(seen.len(), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::Resize(..))), 2);
        assert_eq!(backend.count(|c| matches!(c, Call::Present)), 1);
        let first_idle = backend
            .calls
            .iter()
            .position(|c| matches!(c, Call::Idle(_)))
            .unwrap();
        assert_eq!(backend.calls[first_idle - 1], Call::Create);
        assert!(backend.violations.is_empty());
    }

    #[test]
    fn zero_idle_wait_skips_idle() {
        let mut backend = MockBackend::default();
        let target = MockTarget::new(vec![unfocused(R), gone()]);
        let mut frame_loop = FrameLoop::new(LoopOptions {
            idle_wait: Duration::ZERO,
        });
        let exit = frame_loop.run(&mut backend, &target, |_, _, _| {});
        assert_eq!(exit, LoopExit::TargetClosed);
        assert_eq!(backend.calls, vec![Call::Release]);
    }

    #[test]
    fn failed_resize_drops_frame_and_retries() {
        let mut backend = MockBackend {
            fail_resize: 1,
            ..Default::default()
        };
        let target = MockTarget::new(vec![focused(R), focused(R), gone()]);
        let mut frame_loop = FrameLoop::new(LoopOptions::default());
        let frames = Cell::new(0);
        let mut cb = |_: bool, _: Rect, ui: Option<&FakeUi>| {
            if ui.is_some() {
                frames.set(frames.get() + 1);
            }
        };

        assert_eq!(frame_loop.step(&mut backend, &target, &mut cb), Step::Continue);
        assert_eq!(frames.get(), 0);
        assert_eq!(
            backend.calls,
            vec![
                Call::Place(R),
                Call::Release,
                Call::Resize(800, 600),
                Call::Idle(Duration::from_millis(100)),
            ]
        );
        assert!(!backend.has_view());

        // Same geometry, but the missing view forces the rebind again.
        backend.calls.clear();
        assert_eq!(frame_loop.step(&mut backend, &target, &mut cb), Step::Continue);
        assert_eq!(frames.get(), 1);
        assert_eq!(
            backend.calls,
            vec![
                Call::Place(R),
                Call::Release,
                Call::Resize(800, 600),
                Call::Create,
                Call::Frame(800, 600),
                Call::Bind,
                Call::Render(0),
                Call::Present,
            ]
        );
        assert!(backend.violations.is_empty());
    }
}
