use std::cell::RefCell;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use saveex::{
    AutosaveController, Command, ConfirmationPrompt, LocalBackend, MemoryStore, MonoMetrics,
    SaveConfig, ScreenshotCodec, SlotId, SlotRegistry, StorageBackend, TransitionDecision,
    TransitionFlow, WebBackend,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod host;

use host::DemoHost;

const CONFIG_ENV_VAR: &str = "SAVEEX_CONFIG";
const TARGET_ENV_VAR: &str = "SAVEEX_TARGET";
const ROOT_ENV_VAR: &str = "SAVEEX_ROOT";
const DEFAULT_CONFIG_FILE: &str = "saveex.json";
const VIEWPORT_WIDTH: u32 = 816;
const FRAME_WIDTH: u32 = 816;
const FRAME_HEIGHT: u32 = 624;

fn main() {
    init_tracing();
    info!("=== SaveEx Demo Startup ===");

    let config = match load_config() {
        Ok(config) => config,
        Err(message) => {
            error!(error = %message, "config_invalid");
            std::process::exit(1);
        }
    };

    if let Err(err) = run_demo(config) {
        error!(error = %err, "demo_failed");
        std::process::exit(1);
    }
}

/// Drives one scripted pass over the save flows: a fresh save, an autosave
/// command, a prompted overwrite, a suppressed autosave, and an exit
/// warning. Everything a menu scene would do interactively, minus the menu.
fn run_demo(config: SaveConfig) -> Result<(), String> {
    let root = resolve_root();
    let backend = build_backend(&config, &root);
    let backend_is_local = backend.is_local();

    let registry = Rc::new(RefCell::new(SlotRegistry::open(backend, &config)));
    let controller = Rc::new(RefCell::new(AutosaveController::from_config(
        &config,
        backend_is_local,
    )));
    let codec = Rc::new(RefCell::new(ScreenshotCodec::default()));
    let host = Rc::new(RefCell::new(DemoHost::new(FRAME_WIDTH, FRAME_HEIGHT)));
    let flow = TransitionFlow::from_config(&config);
    let mut prompt = ConfirmationPrompt::default();
    let metrics = MonoMetrics::default();

    let slot = SlotId(3);
    host.borrow_mut().advance_playtime(95);

    // First save into an empty slot runs without a prompt.
    let decision = request_save(
        &flow, &mut prompt, &metrics, &config, &registry, &codec, &host, slot,
    );
    info!(slot = slot.0, ?decision, "initial_save");

    // The scripting layer dispatches the autosave command token.
    dispatch_command("autosave", &controller, &registry, &codec, &host);

    // Saving over our own slot now walks through the overwrite prompt; the
    // demo stands in for the player and confirms.
    host.borrow_mut().enter_map(2, "Harbor Town");
    host.borrow_mut().advance_playtime(240);
    let decision = request_save(
        &flow, &mut prompt, &metrics, &config, &registry, &codec, &host, slot,
    );
    info!(slot = slot.0, ?decision, "overwrite_requested");
    if decision == TransitionDecision::Prompted {
        let resolution = prompt
            .select(0, controller.borrow_mut().gate_mut())
            .ok_or("overwrite prompt had no open state")?;
        info!(phase = ?resolution.phase, "overwrite_resolved");
    }

    // The confirmed prompt armed the gate, so this request is dropped.
    dispatch_command("autosave", &controller, &registry, &codec, &host);

    // Exit warning: cancel once, then confirm.
    flow.on_menu_closed();
    let exited = Rc::new(RefCell::new(false));
    for scripted_choice in [1usize, 0] {
        let exit_flag = Rc::clone(&exited);
        let decision = flow.request_exit(
            &mut prompt,
            &metrics,
            VIEWPORT_WIDTH,
            Box::new(move || *exit_flag.borrow_mut() = true),
        );
        if decision == TransitionDecision::Prompted {
            let resolution = prompt
                .select(scripted_choice, controller.borrow_mut().gate_mut())
                .ok_or("exit prompt had no open state")?;
            info!(phase = ?resolution.phase, fade = resolution.fade, "exit_resolved");
        }
        if *exited.borrow() {
            break;
        }
    }

    let registry = registry.borrow();
    for id in 1..=registry.max_slots() {
        let slot = SlotId(id);
        if let Some(entry) = registry.entry(slot) {
            info!(
                label = %registry.slot_label(slot),
                title = %entry.title,
                playtime = %entry.playtime,
                owned = registry.belongs_to_current_session(slot),
                "slot_row"
            );
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn request_save(
    flow: &TransitionFlow,
    prompt: &mut ConfirmationPrompt,
    metrics: &MonoMetrics,
    config: &SaveConfig,
    registry: &Rc<RefCell<SlotRegistry>>,
    codec: &Rc<RefCell<ScreenshotCodec>>,
    host: &Rc<RefCell<DemoHost>>,
    slot: SlotId,
) -> TransitionDecision {
    use saveex::SaveHost as _;

    // Interactive saves snapshot the scene on the way into the menu; the
    // demo captures here instead.
    if config.screenshot.enabled {
        let options = config
            .screenshot
            .process_options(config.image_format(), registry.borrow().is_local());
        if let Some(snapshot) = host.borrow().frame() {
            if let Err(err) = codec.borrow_mut().capture_into_pending(&snapshot, &options) {
                warn!(error = %err, "screenshot_capture_failed");
            }
        }
    }

    let slot_owned = registry.borrow().belongs_to_current_session(slot);
    let action_registry = Rc::clone(registry);
    let action_codec = Rc::clone(codec);
    let action_host = Rc::clone(host);
    flow.request_save(
        prompt,
        metrics,
        VIEWPORT_WIDTH,
        slot_owned,
        Box::new(move || {
            perform_save(&action_registry, &action_codec, &action_host, slot);
        }),
    )
}

fn perform_save(
    registry: &Rc<RefCell<SlotRegistry>>,
    codec: &Rc<RefCell<ScreenshotCodec>>,
    host: &Rc<RefCell<DemoHost>>,
    slot: SlotId,
) {
    use saveex::SaveHost as _;

    let mut host = host.borrow_mut();
    host.before_save();
    let screenshot = codec.borrow_mut().take_pending();
    match registry
        .borrow_mut()
        .save_slot(slot, host.state(), screenshot)
    {
        Ok(()) => info!(slot = slot.0, "save_written"),
        Err(err) => warn!(slot = slot.0, error = %err, "save_failed"),
    }
}

fn dispatch_command(
    token: &str,
    controller: &Rc<RefCell<AutosaveController>>,
    registry: &Rc<RefCell<SlotRegistry>>,
    codec: &Rc<RefCell<ScreenshotCodec>>,
    host: &Rc<RefCell<DemoHost>>,
) {
    match Command::parse(token) {
        Some(Command::Autosave) => {
            let written = controller.borrow_mut().request_autosave(
                &mut *host.borrow_mut(),
                &mut codec.borrow_mut(),
                &mut registry.borrow_mut(),
            );
            info!(written, "autosave_command");
        }
        None => warn!(token, "unknown_command"),
    }
}

fn build_backend(config: &SaveConfig, root: &Path) -> Box<dyn StorageBackend> {
    let target = env::var(TARGET_ENV_VAR).unwrap_or_default();
    if target == "web" {
        Box::new(WebBackend::new(
            MemoryStore::default(),
            config.slot_naming(),
            config.web_prepend.then_some(config.game_title.as_str()),
        ))
    } else {
        Box::new(LocalBackend::new(
            root.join("save"),
            root.join(&config.screenshot.directory),
            config.image_format().extension(),
            config.slot_naming(),
        ))
    }
}

fn resolve_root() -> PathBuf {
    env::var(ROOT_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn load_config() -> Result<SaveConfig, String> {
    let path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = if path.is_file() {
        let raw = fs::read_to_string(&path)
            .map_err(|error| format!("failed to read {}: {error}", path.display()))?;
        parse_config(&raw).map_err(|message| format!("{}: {message}", path.display()))?
    } else {
        SaveConfig::default()
    };
    config.normalized().map_err(|error| error.to_string())
}

fn parse_config(raw: &str) -> Result<SaveConfig, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|error| format!("{} at {}", error.inner(), error.path()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
