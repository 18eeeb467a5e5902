use std::env::var;
use std::time::Duration;

pub struct Config {
    /// Socket address the server listens on.
    pub bind: String,
    /// Route prefix for the JSON API.
    pub api_route: String,
    /// Route prefix for the live-update WebSocket channels.
    pub ws_route: String,
    pub enable_cors: bool,
    /// How long a closed poll's channel keeps delivering before teardown.
    pub close_grace: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let bind = var("BLINDPOLL_BIND").unwrap_or_else(|_| "127.0.0.1:3001".to_owned());
        let api_route = var("BLINDPOLL_API_ROUTE").unwrap_or_else(|_| "/blindpoll/api".to_owned());
        let ws_route = var("BLINDPOLL_WS_ROUTE").unwrap_or_else(|_| "/blindpoll/ws".to_owned());

        let enable_cors = match var("BLINDPOLL_ENABLE_CORS") {
            Ok(val) => val == "true",
            Err(_e) => true,
        };

        let close_grace = match var("BLINDPOLL_CLOSE_GRACE_SECS") {
            Ok(val) => {
                let secs: u64 = val
                    .parse()
                    .expect("BLINDPOLL_CLOSE_GRACE_SECS must be an integer number of seconds");
                Duration::from_secs(secs)
            }
            Err(_e) => Duration::from_secs(10),
        };

        Config {
            bind,
            api_route,
            ws_route,
            enable_cors,
            close_grace,
        }
    }
}
