// ~/src/event_router.rs
//
// Desktop-level windows never get pointer input through normal focus and
// hit-testing, so a system-wide passive monitor observes pointer events and
// they are replayed into the render surface.
//
//   PointerEventSource (OS hook) -> GlobalEventRouter -> PointerSink (renderer)

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use crate::{
    debug,
    errors::Result,
    geometry::{ScreenPoint, ScreenRect},
    info, DEBUG_NAME,
};

/// Event classes the monitor subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    MouseMoved,
    MouseEntered,
    MouseExited,
    LeftMouseDown,
    LeftMouseUp,
    RightMouseDown,
    RightMouseUp,
    LeftMouseDragged,
    RightMouseDragged,
}

impl RawEventKind {
    #[cfg(test)]
    pub const MONITORED: [RawEventKind; 9] = [
        RawEventKind::MouseMoved,
        RawEventKind::MouseEntered,
        RawEventKind::MouseExited,
        RawEventKind::LeftMouseDown,
        RawEventKind::LeftMouseUp,
        RawEventKind::RightMouseDown,
        RawEventKind::RightMouseUp,
        RawEventKind::LeftMouseDragged,
        RawEventKind::RightMouseDragged,
    ];
}

/// Handlers a render surface exposes for forwarded input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardedKind {
    Move,
    Enter,
    Exit,
    Up,
    Down,
    Drag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub kind: RawEventKind,
    pub position: ScreenPoint,
}

impl PointerEvent {
    pub const fn new(kind: RawEventKind, position: ScreenPoint) -> Self {
        Self { kind, position }
    }
}

/// Both button-ups collapse into `Up` and both drags into `Drag`.
/// A secondary-button press is never forwarded.
pub const fn forward_kind(kind: RawEventKind) -> Option<ForwardedKind> {
    match kind {
        RawEventKind::MouseMoved => Some(ForwardedKind::Move),
        RawEventKind::MouseEntered => Some(ForwardedKind::Enter),
        RawEventKind::MouseExited => Some(ForwardedKind::Exit),
        RawEventKind::LeftMouseUp | RawEventKind::RightMouseUp => Some(ForwardedKind::Up),
        RawEventKind::LeftMouseDown => Some(ForwardedKind::Down),
        RawEventKind::RightMouseDown => None,
        RawEventKind::LeftMouseDragged | RawEventKind::RightMouseDragged => Some(ForwardedKind::Drag),
    }
}

/// Input surface of the embedded renderer. Called on the main thread once per
/// event, synchronously, so implementations must return quickly.
pub trait PointerSink {
    fn move_to(&self, event: &PointerEvent);
    fn enter(&self, event: &PointerEvent);
    fn exit(&self, event: &PointerEvent);
    fn up(&self, event: &PointerEvent);
    fn down(&self, event: &PointerEvent);
    fn drag(&self, event: &PointerEvent);
}

pub fn deliver(sink: &dyn PointerSink, kind: ForwardedKind, event: &PointerEvent) {
    match kind {
        ForwardedKind::Move => sink.move_to(event),
        ForwardedKind::Enter => sink.enter(event),
        ForwardedKind::Exit => sink.exit(event),
        ForwardedKind::Up => sink.up(event),
        ForwardedKind::Down => sink.down(event),
        ForwardedKind::Drag => sink.drag(event),
    }
}

/// Finds the current render sink, if one exists right now.
pub trait SinkResolver {
    /// Runs `f` against the sink and returns `true`, or returns `false` when
    /// no sink is currently available.
    fn with_sink(&self, f: &mut dyn FnMut(&dyn PointerSink)) -> bool;
}

/// Slot the window host fills with the embedded renderer's sink.
pub type SurfaceSlot = Rc<RefCell<Option<Box<dyn PointerSink>>>>;

pub fn new_surface_slot() -> SurfaceSlot {
    Rc::new(RefCell::new(None))
}

/// Non-owning view of the host's surface slot, resolved again on every event
/// so renderer rebuilds are picked up without re-registration.
#[derive(Clone)]
pub struct RenderSurfaceHandle {
    slot: Weak<RefCell<Option<Box<dyn PointerSink>>>>,
}

impl RenderSurfaceHandle {
    pub fn new(slot: &SurfaceSlot) -> Self {
        Self {
            slot: Rc::downgrade(slot),
        }
    }
}

impl SinkResolver for RenderSurfaceHandle {
    fn with_sink(&self, f: &mut dyn FnMut(&dyn PointerSink)) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        let Ok(guard) = slot.try_borrow() else {
            return false;
        };
        match guard.as_deref() {
            Some(sink) => {
                f(sink);
                true
            }
            None => false,
        }
    }
}

/// Config switches for which event groups get forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardFilter {
    pub send_move: bool,
    pub send_click: bool,
}

impl Default for ForwardFilter {
    fn default() -> Self {
        Self {
            send_move: true,
            send_click: true,
        }
    }
}

impl ForwardFilter {
    pub fn allows(&self, kind: ForwardedKind) -> bool {
        match kind {
            ForwardedKind::Move | ForwardedKind::Enter | ForwardedKind::Exit | ForwardedKind::Drag => {
                self.send_move
            }
            ForwardedKind::Up | ForwardedKind::Down => self.send_click,
        }
    }
}

/// Maps, filters and delivers one captured event. Returns the handler that
/// ran, or `None` when the event was dropped.
pub fn route_event(
    resolver: &dyn SinkResolver,
    filter: ForwardFilter,
    event: &PointerEvent,
) -> Option<ForwardedKind> {
    let kind = forward_kind(event.kind)?;
    if !filter.allows(kind) {
        return None;
    }

    let delivered = resolver.with_sink(&mut |sink| deliver(sink, kind, event));
    if !delivered {
        debug!(
            "[{}][ROUTER] No render surface for {:?}; dropped",
            DEBUG_NAME, event.kind
        );
        return None;
    }
    Some(kind)
}

/// System-wide passive pointer monitor. Must observe copies of events only,
/// never consume them.
pub trait PointerEventSource {
    fn install(&mut self, callback: Box<dyn FnMut(PointerEvent)>) -> Result<()>;
    fn uninstall(&mut self);
    /// Area the forwarded pointer is tracked against.
    fn set_frame(&mut self, _frame: ScreenRect) {}
}

pub struct GlobalEventRouter<S: PointerEventSource> {
    source: S,
    resolver: Rc<dyn SinkResolver>,
    filter: Rc<Cell<ForwardFilter>>,
    installed: bool,
}

impl<S: PointerEventSource> GlobalEventRouter<S> {
    pub fn new(source: S, resolver: Rc<dyn SinkResolver>) -> Self {
        Self {
            source,
            resolver,
            filter: Rc::new(Cell::new(ForwardFilter::default())),
            installed: false,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.installed
    }

    pub fn set_filter(&self, filter: ForwardFilter) {
        self.filter.set(filter);
    }

    pub fn set_frame(&mut self, frame: ScreenRect) {
        self.source.set_frame(frame);
    }

    /// Installs the single monitor; a second call while running does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.installed {
            return Ok(());
        }

        let resolver = Rc::clone(&self.resolver);
        let filter = Rc::clone(&self.filter);
        self.source.install(Box::new(move |event| {
            let _ = route_event(resolver.as_ref(), filter.get(), &event);
        }))?;

        self.installed = true;
        info!("[{}][ROUTER] Global pointer monitor installed", DEBUG_NAME);
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.installed {
            return;
        }
        self.source.uninstall();
        self.installed = false;
        info!("[{}][ROUTER] Global pointer monitor removed", DEBUG_NAME);
    }
}

impl<S: PointerEventSource> Drop for GlobalEventRouter<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Low-level pointer notifications as an OS hook reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMessage {
    Move,
    LeftDown,
    LeftUp,
    RightDown,
    RightUp,
}

/// Turns raw hook notifications into the monitored event classes: moves with
/// a button held become drags, and crossings of the tracked frame produce
/// enter/exit. Nothing outside the frame is reported except the exit itself.
#[derive(Debug, Default)]
pub struct PointerTracker {
    frame: Option<ScreenRect>,
    left_held: bool,
    right_held: bool,
    inside: Option<bool>,
}

impl PointerTracker {
    pub fn new(frame: ScreenRect) -> Self {
        Self {
            frame: Some(frame),
            ..Self::default()
        }
    }

    pub fn set_frame(&mut self, frame: ScreenRect) {
        self.frame = Some(frame);
        self.inside = None;
    }

    pub fn track(&mut self, message: HookMessage, position: ScreenPoint) -> Vec<PointerEvent> {
        let mut events = Vec::with_capacity(2);
        let inside = self.frame.map(|f| f.contains(position)).unwrap_or(false);

        match self.inside {
            Some(false) | None if inside => {
                events.push(PointerEvent::new(RawEventKind::MouseEntered, position));
            }
            Some(true) if !inside => {
                events.push(PointerEvent::new(RawEventKind::MouseExited, position));
            }
            _ => {}
        }
        self.inside = Some(inside);

        let kind = match message {
            HookMessage::Move if self.left_held => Some(RawEventKind::LeftMouseDragged),
            HookMessage::Move if self.right_held => Some(RawEventKind::RightMouseDragged),
            HookMessage::Move => Some(RawEventKind::MouseMoved),
            HookMessage::LeftDown => {
                self.left_held = true;
                Some(RawEventKind::LeftMouseDown)
            }
            HookMessage::LeftUp => {
                self.left_held = false;
                Some(RawEventKind::LeftMouseUp)
            }
            HookMessage::RightDown => {
                self.right_held = true;
                Some(RawEventKind::RightMouseDown)
            }
            HookMessage::RightUp => {
                self.right_held = false;
                Some(RawEventKind::RightMouseUp)
            }
        };

        if inside {
            if let Some(kind) = kind {
                events.push(PointerEvent::new(kind, position));
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        calls: RefCell<Vec<(ForwardedKind, RawEventKind)>>,
    }

    impl RecordingSink {
        fn record(&self, kind: ForwardedKind, event: &PointerEvent) {
            self.calls.borrow_mut().push((kind, event.kind));
        }
    }

    impl PointerSink for Rc<RecordingSink> {
        fn move_to(&self, event: &PointerEvent) {
            self.record(ForwardedKind::Move, event)
        }
        fn enter(&self, event: &PointerEvent) {
            self.record(ForwardedKind::Enter, event)
        }
        fn exit(&self, event: &PointerEvent) {
            self.record(ForwardedKind::Exit, event)
        }
        fn up(&self, event: &PointerEvent) {
            self.record(ForwardedKind::Up, event)
        }
        fn down(&self, event: &PointerEvent) {
            self.record(ForwardedKind::Down, event)
        }
        fn drag(&self, event: &PointerEvent) {
            self.record(ForwardedKind::Drag, event)
        }
    }

    /// Stands in for the OS hook: keeps the callback so tests can fire events.
    #[derive(Default, Clone)]
    struct ManualSource {
        callback: Rc<RefCell<Option<Box<dyn FnMut(PointerEvent)>>>>,
        installs: Rc<Cell<usize>>,
        uninstalls: Rc<Cell<usize>>,
    }

    impl ManualSource {
        fn fire(&self, kind: RawEventKind) {
            if let Some(cb) = self.callback.borrow_mut().as_mut() {
                cb(PointerEvent::new(kind, ScreenPoint::new(10, 10)));
            }
        }
    }

    impl PointerEventSource for ManualSource {
        fn install(&mut self, callback: Box<dyn FnMut(PointerEvent)>) -> Result<()> {
            self.installs.set(self.installs.get() + 1);
            *self.callback.borrow_mut() = Some(callback);
            Ok(())
        }

        fn uninstall(&mut self) {
            self.uninstalls.set(self.uninstalls.get() + 1);
            *self.callback.borrow_mut() = None;
        }
    }

    fn wired() -> (SurfaceSlot, Rc<RecordingSink>, ManualSource, GlobalEventRouter<ManualSource>) {
        let slot = new_surface_slot();
        let sink = Rc::new(RecordingSink::default());
        *slot.borrow_mut() = Some(Box::new(sink.clone()));
        let source = ManualSource::default();
        let router = GlobalEventRouter::new(source.clone(), Rc::new(RenderSurfaceHandle::new(&slot)));
        (slot, sink, source, router)
    }

    #[test]
    fn mapping_table() {
        use ForwardedKind::*;
        use RawEventKind::*;

        assert_eq!(forward_kind(MouseMoved), Some(Move));
        assert_eq!(forward_kind(MouseEntered), Some(Enter));
        assert_eq!(forward_kind(MouseExited), Some(Exit));
        assert_eq!(forward_kind(LeftMouseUp), Some(Up));
        assert_eq!(forward_kind(RightMouseUp), Some(Up));
        assert_eq!(forward_kind(LeftMouseDown), Some(Down));
        assert_eq!(forward_kind(RightMouseDown), None);
        assert_eq!(forward_kind(LeftMouseDragged), Some(Drag));
        assert_eq!(forward_kind(RightMouseDragged), Some(Drag));
    }

    #[test]
    fn secondary_down_never_reaches_the_sink() {
        let (_slot, sink, source, mut router) = wired();
        router.start().unwrap();

        source.fire(RawEventKind::RightMouseDown);
        assert!(sink.calls.borrow().is_empty());
    }

    #[test]
    fn both_button_ups_share_one_handler() {
        let (_slot, sink, source, mut router) = wired();
        router.start().unwrap();

        source.fire(RawEventKind::LeftMouseUp);
        source.fire(RawEventKind::RightMouseUp);
        assert_eq!(
            *sink.calls.borrow(),
            vec![
                (ForwardedKind::Up, RawEventKind::LeftMouseUp),
                (ForwardedKind::Up, RawEventKind::RightMouseUp),
            ]
        );
    }

    #[test]
    fn events_arrive_in_delivery_order() {
        let (_slot, sink, source, mut router) = wired();
        router.start().unwrap();

        for kind in RawEventKind::MONITORED {
            source.fire(kind);
        }
        let forwarded: Vec<ForwardedKind> = sink.calls.borrow().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            forwarded,
            vec![
                ForwardedKind::Move,
                ForwardedKind::Enter,
                ForwardedKind::Exit,
                ForwardedKind::Down,
                ForwardedKind::Up,
                ForwardedKind::Up,
                ForwardedKind::Drag,
                ForwardedKind::Drag,
            ]
        );
    }

    #[test]
    fn missing_surface_drops_events_silently() {
        let (slot, sink, source, mut router) = wired();
        router.start().unwrap();

        let previous = slot.borrow_mut().take();
        source.fire(RawEventKind::MouseMoved);
        assert!(sink.calls.borrow().is_empty());

        *slot.borrow_mut() = previous;
        source.fire(RawEventKind::MouseMoved);
        assert_eq!(sink.calls.borrow().len(), 1);
    }

    #[test]
    fn dropped_slot_resolves_to_nothing() {
        let slot = new_surface_slot();
        let handle = RenderSurfaceHandle::new(&slot);
        drop(slot);
        assert!(!handle.with_sink(&mut |_| panic!("sink must not resolve")));
    }

    #[test]
    fn start_installs_once_and_stop_is_idempotent() {
        let (_slot, _sink, source, mut router) = wired();

        router.stop();
        assert_eq!(source.uninstalls.get(), 0);

        router.start().unwrap();
        router.start().unwrap();
        assert_eq!(source.installs.get(), 1);
        assert!(router.is_running());

        router.stop();
        router.stop();
        assert_eq!(source.uninstalls.get(), 1);
        assert!(!router.is_running());
    }

    #[test]
    fn filter_gates_move_and_click_groups() {
        let (_slot, sink, source, mut router) = wired();
        router.start().unwrap();
        router.set_filter(ForwardFilter {
            send_move: false,
            send_click: true,
        });

        source.fire(RawEventKind::MouseMoved);
        source.fire(RawEventKind::LeftMouseDragged);
        source.fire(RawEventKind::LeftMouseDown);
        assert_eq!(
            *sink.calls.borrow(),
            vec![(ForwardedKind::Down, RawEventKind::LeftMouseDown)]
        );
    }

    #[test]
    fn tracker_synthesizes_enter_exit_and_drags() {
        let mut tracker = PointerTracker::new(ScreenRect::new(0, 0, 100, 100));
        let kinds = |events: Vec<PointerEvent>| events.into_iter().map(|e| e.kind).collect::<Vec<_>>();

        assert_eq!(
            kinds(tracker.track(HookMessage::Move, ScreenPoint::new(10, 10))),
            vec![RawEventKind::MouseEntered, RawEventKind::MouseMoved]
        );
        assert_eq!(
            kinds(tracker.track(HookMessage::LeftDown, ScreenPoint::new(10, 10))),
            vec![RawEventKind::LeftMouseDown]
        );
        assert_eq!(
            kinds(tracker.track(HookMessage::Move, ScreenPoint::new(20, 10))),
            vec![RawEventKind::LeftMouseDragged]
        );
        assert_eq!(
            kinds(tracker.track(HookMessage::LeftUp, ScreenPoint::new(20, 10))),
            vec![RawEventKind::LeftMouseUp]
        );
        assert_eq!(
            kinds(tracker.track(HookMessage::RightDown, ScreenPoint::new(20, 10))),
            vec![RawEventKind::RightMouseDown]
        );
        assert_eq!(
            kinds(tracker.track(HookMessage::Move, ScreenPoint::new(30, 10))),
            vec![RawEventKind::RightMouseDragged]
        );
        assert_eq!(
            kinds(tracker.track(HookMessage::Move, ScreenPoint::new(300, 10))),
            vec![RawEventKind::MouseExited]
        );
        assert_eq!(
            kinds(tracker.track(HookMessage::RightUp, ScreenPoint::new(300, 10))),
            Vec::<RawEventKind>::new()
        );
        assert_eq!(
            kinds(tracker.track(HookMessage::Move, ScreenPoint::new(50, 50))),
            vec![RawEventKind::MouseEntered, RawEventKind::MouseMoved]
        );
    }

    #[test]
    fn tracker_without_frame_reports_nothing() {
        let mut tracker = PointerTracker::default();
        assert!(tracker.track(HookMessage::LeftDown, ScreenPoint::new(1, 1)).is_empty());
    }
}
