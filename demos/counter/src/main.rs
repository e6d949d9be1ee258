//! A host loop driving two screens that share a counter through a context.

use std::rc::Rc;

use rehook_core::*;
use rehook_devtools::{DumpFlags, Inspector, init_logger};

struct CounterContext {
    count: ContextState<i32>,
}

impl Context for CounterContext {}

struct CounterScreen {
    owner: Owner,
    count: State<i32>,
    _context: Rc<CounterContext>,
}

impl Mountable for CounterScreen {
    fn owner(&self) -> &Owner {
        &self.owner
    }
}

impl CounterScreen {
    fn new(registry: &Registry) -> Self {
        let owner = registry.mount();
        let count = owner.use_state(1);
        let context = owner.create_context(Rc::new(CounterContext {
            count: ContextState::new(&count),
        }));
        owner.use_effect(
            {
                let count = count.clone();
                move || log::info!("counter screen: count = {}", count.get())
            },
            &[&count],
        );
        Self {
            owner,
            count,
            _context: context,
        }
    }

    fn tap(&self) {
        self.count.update(|c| *c += 1);
    }
}

struct BadgeScreen {
    owner: Owner,
}

impl Mountable for BadgeScreen {
    fn owner(&self) -> &Owner {
        &self.owner
    }
}

impl BadgeScreen {
    fn new(registry: &Registry) -> Self {
        let screen = Self {
            owner: registry.mount(),
        };
        match screen.use_context::<CounterContext>() {
            Some(context) => {
                let weak = Rc::downgrade(&context);
                screen.use_effect(
                    move || {
                        if let Some(n) = weak.upgrade().and_then(|c| c.count.get()) {
                            log::info!("badge: {n}");
                        }
                    },
                    &[&context.count],
                );
            }
            None => log::warn!("badge: no counter context"),
        }
        screen
    }
}

fn main() {
    init_logger();
    let registry = Registry::new();
    let mut inspector = Inspector::new().with_flags(DumpFlags::all());

    let counter = CounterScreen::new(&registry);
    let badge = BadgeScreen::new(&registry);

    for _ in 0..3 {
        counter.tap();
        inspector.idle(&registry);
    }
    log::info!("{}", inspector.hud_text(&registry));

    drop(badge);
    counter.tap();
    inspector.idle(&registry);

    drop(counter);
    inspector.idle(&registry);
    log::info!("{}", inspector.hud_text(&registry));
}
