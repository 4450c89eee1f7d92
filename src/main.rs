use eframe::egui;
use roughness_pca::app::RoughnessPcaApp;

fn main() -> eframe::Result {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([640.0, 420.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Roughness PCA Explorer",
        options,
        Box::new(|_cc| Ok(Box::new(RoughnessPcaApp::default()))),
    )
}
