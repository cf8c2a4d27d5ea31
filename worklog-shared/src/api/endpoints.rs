//! Canonical URL builders shared by the server, its tests and clients.

pub const API_V1_PREFIX: &str = "/api/v1";

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn session(base: &str) -> String {
    base_join(base, &format!("{}/session", API_V1_PREFIX))
}
pub fn session_start(base: &str) -> String {
    base_join(base, &format!("{}/session/start", API_V1_PREFIX))
}
pub fn session_stop(base: &str) -> String {
    base_join(base, &format!("{}/session/stop", API_V1_PREFIX))
}
pub fn entries(base: &str) -> String {
    base_join(base, &format!("{}/entries", API_V1_PREFIX))
}
pub fn entry(base: &str, id: i32) -> String {
    base_join(base, &format!("{}/entries/{}", API_V1_PREFIX, id))
}
pub fn entries_payment_status(base: &str) -> String {
    base_join(base, &format!("{}/entries/payment-status", API_V1_PREFIX))
}
pub fn invoice(base: &str) -> String {
    base_join(base, &format!("{}/invoice", API_V1_PREFIX))
}
pub fn share(base: &str) -> String {
    base_join(base, &format!("{}/share", API_V1_PREFIX))
}
pub fn share_view(base: &str, token: &str) -> String {
    base_join(base, &format!("{}/share/{}", API_V1_PREFIX, token))
}
pub fn settings(base: &str) -> String {
    base_join(base, &format!("{}/settings", API_V1_PREFIX))
}
