use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::chat::{ChatService, SqliteChatRepository};
use crate::config::Config;
use crate::realtime::Hub;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub chat: Arc<ChatService>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let hub = Arc::new(Hub::new());
        let chat = ChatService::new(Arc::new(SqliteChatRepository::new(db.clone())), hub.clone());
        Self {
            db,
            config: Arc::new(config),
            hub,
            chat: Arc::new(chat),
        }
    }
}
