//! Logs in against a mock API, then fetches a collection after the access token has expired.
//!
//! The first `GET /api/cats/` is rejected with 401. The client exchanges the refresh token once,
//! stores the new access token, and replays the request with it.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::{Value, json};
// self
use session_relay::{client::SessionClient, config::ClientConfig, store::MemoryStore};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/accounts/login/");
			then.status(200)
				.json_body(json!({ "access": "demo-access-1", "refresh": "demo-refresh" }));
		})
		.await;
	let profile_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/accounts/profile/");
			then.status(200).json_body(json!({ "username": "mike", "email": "mike@cats.test" }));
		})
		.await;
	let expired_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/cats/").header("authorization", "Bearer demo-access-1");
			then.status(401).json_body(json!({ "detail": "Token expired" }));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/accounts/token/refresh/")
				.json_body(json!({ "refresh": "demo-refresh" }));
			then.status(200).json_body(json!({ "access": "demo-access-2" }));
		})
		.await;
	let cats_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/cats/").header("authorization", "Bearer demo-access-2");
			then.status(200).json_body(json!([{ "name": "Tom" }, { "name": "Felix" }]));
		})
		.await;
	let config = ClientConfig::builder(server.base_url()).build()?;
	let client = SessionClient::new(config, Arc::new(MemoryStore::default()))?;
	let profile: Value = client.login("mike", "whiskers").await?;

	println!("Logged in as {}.", profile["username"]);

	let cats: Value = client.get_json("/api/cats/").await?;

	println!("Fetched {cats} after {} refresh exchange(s).", client.metrics().exchanges());

	login_mock.assert_async().await;
	profile_mock.assert_async().await;
	expired_mock.assert_async().await;
	refresh_mock.assert_async().await;
	cats_mock.assert_async().await;

	Ok(())
}
