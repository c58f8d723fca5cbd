#![windows_subsystem = "windows"]

mod bootstrap;
mod data_loaders;
mod errors;
mod event_router;
mod geometry;
mod host;
mod logging;
mod placeholder;
mod platform;
mod state_store;
mod utility;

use std::{
	cell::{Cell, RefCell},
	fs,
	path::{Path, PathBuf},
	process::ExitCode,
	rc::Rc,
	sync::Arc,
	thread,
	time::{Duration, Instant, SystemTime},
};

use crate::{
	data_loaders::{config::HostConfig, project::WallpaperProject, project::PROJECT_FILE_NAME, yaml},
	errors::HostError,
	host::{HostEvent, WallpaperWindowHost},
	placeholder::PlaceholderGenerator,
	state_store::{DesktopBackground, JsonPreferenceStore, WallpaperStateStore},
	utility::user_caches_dir,
};

pub const ADDON_NAME: &str = "wallpaper-host";
pub const DEBUG_NAME: &str = "WALLPAPER";

fn modified_at(path: &Path) -> Option<SystemTime> {
	fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn load_project(config: &HostConfig) -> Option<WallpaperProject> {
	let selection = config.wallpaper.as_ref()?;
	match WallpaperProject::load(&selection.directory) {
		Ok(project) => {
			info!(
				"[{}] Wallpaper '{}' ({}) from {}",
				DEBUG_NAME,
				project.display_name(),
				project.kind.as_str(),
				selection.directory.display()
			);
			Some(project)
		}
		Err(e) => {
			error!("[{}] Failed to load wallpaper project: {}", DEBUG_NAME, e);
			None
		}
	}
}

fn manifest_path(config: &HostConfig) -> Option<PathBuf> {
	config
		.wallpaper
		.as_ref()
		.map(|w| w.directory.join(PROJECT_FILE_NAME))
}

fn apply_logging(config: &HostConfig) {
	logging::set_debug(config.debug);
	logging::set_level(&config.log_level);
}

fn exit(code: ExitCode) -> ExitCode {
	let _ = logging::flush(Duration::from_secs(2));
	code
}

fn main() -> ExitCode {
	logging::init(true, "info");
	bootstrap::bootstrap_addon();
	platform::init_ui_thread();

	let config_path = bootstrap::config_path();
	let mut config = HostConfig::load(&config_path).unwrap_or_default();

	apply_logging(&config);
	std::panic::set_hook(Box::new(|panic_info| {
		error!("[{}] Panic: {}", DEBUG_NAME, panic_info);
	}));

	info!("!---------- [{}] Starting Wallpaper Host ----------!", DEBUG_NAME);
	info!("[{}] Config loaded from {}", DEBUG_NAME, config_path.display());

	let caches_dir = user_caches_dir();
	let background: Rc<dyn DesktopBackground> = Rc::new(platform::SystemBackground);
	let state = WallpaperStateStore::new(
		Box::new(JsonPreferenceStore::new(bootstrap::state_path())),
		Rc::clone(&background),
	);
	let placeholder = PlaceholderGenerator::new(
		caches_dir.clone(),
		Arc::new(platform::MediaFoundationDecoder),
		background,
	);
	let host = Rc::new(RefCell::new(WallpaperWindowHost::new(
		platform::DesktopWindow::new(caches_dir),
		state,
		placeholder,
		platform::LowLevelMouseSource::new(),
	)));
	host.borrow_mut().apply_settings(&config);

	// Session notices arrive from inside the message pump, which also runs
	// while the renderer is being created. Events that find the host busy
	// wait for the next loop pass.
	let quit = Rc::new(Cell::new(false));
	let deferred: Rc<RefCell<Vec<HostEvent>>> = Rc::new(RefCell::new(Vec::new()));
	platform::set_event_handler({
		let host = Rc::clone(&host);
		let quit = Rc::clone(&quit);
		let deferred = Rc::clone(&deferred);
		move |event| match host.try_borrow_mut() {
			Ok(mut host) => {
				if host.handle_event(event) {
					quit.set(true);
				}
			}
			Err(_) => deferred.borrow_mut().push(event),
		}
	});

	let _session_window = match platform::SessionWindow::create() {
		Ok(window) => Some(window),
		Err(e) => {
			error!("[{}] Session-end handling unavailable: {}", DEBUG_NAME, e);
			None
		}
	};

	let launched = host.borrow_mut().launch(load_project(&config));
	match launched {
		Ok(()) => {}
		Err(HostError::NoPrimaryDisplay) => {
			error!("[{}] No primary display; nothing to host the wallpaper on", DEBUG_NAME);
			return exit(ExitCode::FAILURE);
		}
		Err(e) => {
			error!("[{}] Startup failed: {}", DEBUG_NAME, e);
			host.borrow_mut().shutdown();
			return exit(ExitCode::FAILURE);
		}
	}

	let mut loop_sleep = Duration::from_millis(config.settings.runtime.tick_sleep_ms.max(1));
	let mut display_check_interval =
		Duration::from_millis(config.settings.runtime.display_check_interval_ms.max(250));
	let mut watcher_enabled = config.settings.watcher.enabled;
	let mut watcher_interval = Duration::from_millis(config.settings.watcher.interval_ms.max(100));

	let mut last_display_check = Instant::now();
	let mut last_watch_tick = Instant::now();
	let mut last_config_modified = modified_at(&config_path);
	let mut last_manifest_modified = manifest_path(&config).and_then(|p| modified_at(&p));

	loop {
		if !platform::pump_messages() {
			warn!("[{}] WM_QUIT received; restoring desktop background", DEBUG_NAME);
			host.borrow_mut().shutdown();
			return exit(ExitCode::SUCCESS);
		}

		let pending: Vec<HostEvent> = deferred.borrow_mut().drain(..).collect();
		for event in pending {
			if host.borrow_mut().handle_event(event) {
				quit.set(true);
			}
		}
		if quit.get() {
			info!("[{}] Host stopped; exiting", DEBUG_NAME);
			return exit(ExitCode::SUCCESS);
		}

		host.borrow_mut().tick();

		if last_display_check.elapsed() >= display_check_interval {
			last_display_check = Instant::now();
			host.borrow_mut().refresh_display_frame();
		}

		if watcher_enabled && last_watch_tick.elapsed() >= watcher_interval {
			last_watch_tick = Instant::now();

			let current_modified = modified_at(&config_path);
			let config_changed = match (last_config_modified, current_modified) {
				(Some(prev), Some(curr)) => curr > prev,
				(None, Some(_)) => true,
				_ => false,
			};

			if config_changed {
				last_config_modified = current_modified;
				yaml::invalidate(&config_path);

				match HostConfig::load(&config_path) {
					Some(new_config) => {
						let selection_changed = new_config.wallpaper != config.wallpaper;
						config = new_config;

						apply_logging(&config);
						host.borrow_mut().apply_settings(&config);
						loop_sleep = Duration::from_millis(config.settings.runtime.tick_sleep_ms.max(1));
						display_check_interval =
							Duration::from_millis(config.settings.runtime.display_check_interval_ms.max(250));
						watcher_enabled = config.settings.watcher.enabled;
						watcher_interval = Duration::from_millis(config.settings.watcher.interval_ms.max(100));

						if selection_changed {
							last_manifest_modified = manifest_path(&config).and_then(|p| modified_at(&p));
							if let Some(project) = load_project(&config) {
								host.borrow_mut().set_wallpaper(project);
							}
						}
						info!("[{}][WATCHER] Reloaded config from {}", DEBUG_NAME, config_path.display());
					}
					None => {
						warn!(
							"[{}][WATCHER] Detected config change but failed to parse {}; keeping previous config",
							DEBUG_NAME,
							config_path.display()
						);
					}
				}
			}

			if let Some(manifest) = manifest_path(&config) {
				let current = modified_at(&manifest);
				if current.is_some() && current != last_manifest_modified {
					let first_sighting = last_manifest_modified.is_none();
					last_manifest_modified = current;
					if !first_sighting || host.borrow().active().is_none() {
						if let Some(project) = load_project(&config) {
							info!("[{}][WATCHER] {} changed; reloading wallpaper", DEBUG_NAME, manifest.display());
							host.borrow_mut().set_wallpaper(project);
						}
					}
				}
			}
		}

		thread::sleep(loop_sleep);
	}
}
