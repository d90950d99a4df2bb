use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LocationSettings {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub phone: Option<String>,
    pub email: Option<String>,
}
