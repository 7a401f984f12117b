use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::notifications::{NotificationChannel, create_notifier};
use crate::core::sound::SoundPlayer;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub notifier: Option<Arc<dyn NotificationChannel>>,
    pub sound: Option<SoundPlayer>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let notifier = create_notifier(&config.notifications);
        let sound = config
            .sound
            .enabled
            .then(|| SoundPlayer::new(config.sound.path.clone()));

        Self {
            config: Arc::new(config),
            notifier,
            sound,
        }
    }
}
