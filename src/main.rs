// Prevents additional console window on Windows in release
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::sync::Mutex;

use tauri::{Manager, RunEvent};

use npg_lite_flasher::commands::firmware::{
    delete_custom_firmware,
    download_release_asset,
    fetch_release_assets,
    get_custom_firmware_info,
    import_custom_firmware,
    list_custom_firmware,
};
use npg_lite_flasher::commands::flash::{acknowledge_flash, flash_firmware, get_flash_session};
use npg_lite_flasher::commands::ports::{list_serial_ports, refresh_serial_ports};
use npg_lite_flasher::commands::settings::{get_settings, save_settings};
use npg_lite_flasher::commands::forward_updates;
use npg_lite_flasher::logging;
use npg_lite_flasher::ports::PortMonitorHandle;
use npg_lite_flasher::FlasherService;

/// Background port polling, stopped on exit.
struct MonitorTask(Mutex<Option<PortMonitorHandle>>);

fn main() {
    logging::init();

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let app_data_dir = app.path().app_data_dir()?;
            let resource_dir = app.path().resource_dir()?;
            log::info!("App data directory: {}", app_data_dir.display());

            let service = FlasherService::open(&app_data_dir, &resource_dir)?;
            let monitor = tauri::async_runtime::block_on(service.start_port_monitor());
            forward_updates(app.handle(), &service);

            app.manage(service);
            app.manage(MonitorTask(Mutex::new(Some(monitor))));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Port commands
            list_serial_ports,
            refresh_serial_ports,
            // Flash session commands
            flash_firmware,
            get_flash_session,
            acknowledge_flash,
            // Firmware commands
            list_custom_firmware,
            get_custom_firmware_info,
            delete_custom_firmware,
            import_custom_firmware,
            fetch_release_assets,
            download_release_asset,
            // Settings commands
            get_settings,
            save_settings
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            let monitor = handle
                .try_state::<MonitorTask>()
                .and_then(|task| task.0.lock().ok().and_then(|mut slot| slot.take()));
            if let Some(monitor) = monitor {
                tauri::async_runtime::block_on(monitor.stop());
            }
        }
    });
}
