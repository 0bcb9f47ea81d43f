//! Image selection demo.
//!
//! A small stand-in for the UI scenario the runtime was built around: a
//! grid of image tiles, each rendered by its own component instance, and a
//! selection count derived from all of them. Clicking one tile repaints
//! that tile and nothing else; the counter line reprints only when the
//! derived count actually moves.
//!
//! Run with: `cargo run --example selection`

use std::sync::{Arc, Mutex};

use serde_json::json;

use trellis_core::component::{ComponentHost, ReactiveComponent};
use trellis_core::reactive::{autorun, Computed, Observable};

/// A host that serves every re-render request immediately. A real UI
/// framework would batch these into its frame loop instead.
struct EagerHost {
    render: Mutex<Option<Box<dyn Fn() + Send>>>,
    cleanups: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl EagerHost {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            render: Mutex::new(None),
            cleanups: Mutex::new(Vec::new()),
        })
    }

    /// Wire the render thunk once the instance exists.
    fn set_render(&self, render: Box<dyn Fn() + Send>) {
        *self.render.lock().unwrap() = Some(render);
    }

    fn unmount(&self) {
        *self.render.lock().unwrap() = None;
        let cleanups: Vec<_> = self.cleanups.lock().unwrap().drain(..).collect();
        for cleanup in cleanups {
            cleanup();
        }
    }
}

impl ComponentHost for EagerHost {
    fn request_rerender(&self) {
        if let Some(render) = self.render.lock().unwrap().as_ref() {
            render();
        }
    }

    fn on_unmount(&self, cleanup: Box<dyn FnOnce() + Send>) {
        self.cleanups.lock().unwrap().push(cleanup);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The photo album: four records, one per tile of the grid.
    let images: Vec<Observable> = (1..=4)
        .map(|id| Observable::wrap(json!({ "id": id, "isSelected": false })))
        .collect::<Result<_, _>>()?;

    // Derived count over every tile. It recomputes on any selection write
    // but notifies its readers only when the number moves.
    let counted = images.clone();
    let selected_count = Computed::new(move || {
        counted
            .iter()
            .filter(|image| {
                image
                    .get("isSelected")
                    .map(|value| value == json!(true))
                    .unwrap_or(false)
            })
            .count()
    });

    // A free-standing reaction printing the count as it changes.
    let count_view = selected_count.clone();
    let total = images.len();
    let counter = autorun(move || match count_view.get() {
        Ok(count) => println!("[counter] {} of {} selected", count, total),
        Err(err) => println!("[counter] unavailable: {}", err),
    });

    // One component definition, one mounted instance per tile.
    let tile = ReactiveComponent::new(|image: &Observable| {
        let id = image.get("id").unwrap_or(json!("?"));
        let selected = image.get("isSelected").unwrap_or(json!(false)) == json!(true);
        format!("{} image {}", if selected { "[x]" } else { "[ ]" }, id)
    });

    let mut hosts = Vec::new();
    for image in &images {
        let host = EagerHost::new();
        let instance = tile.mount(host.clone());

        // First paint
        println!("{}", instance.render(image)?);

        let paint_image = image.clone();
        host.set_render(Box::new(move || match instance.render(&paint_image) {
            Ok(line) => println!("{}", line),
            Err(err) => println!("[tile] render failed: {}", err),
        }));
        hosts.push(host);
    }

    println!("-- select image 2 --");
    images[1].set("isSelected", true)?;

    println!("-- select image 4 --");
    images[3].set("isSelected", true)?;

    println!("-- deselect image 2 --");
    images[1].set("isSelected", false)?;

    // Tear everything down: the counter, the derivation, then every tile.
    counter.dispose();
    selected_count.dispose();
    for host in &hosts {
        host.unmount();
    }

    // Nobody is subscribed anymore; this write repaints nothing.
    images[0].set("isSelected", true)?;
    println!("-- done --");

    Ok(())
}
