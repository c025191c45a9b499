//! Integration tests for simulated request flows.
//!
//! Drives the shop application through login, redirects, session
//! carry-over and uploads without a network listener.

mod common;

use common::shop_harness;
use serde_json::json;

#[test]
fn guarded_page_redirects_anonymous_visitors() {
    let harness = shop_harness();
    let http = harness.fake_http();

    http.request("GET", "/dashboard");
    http.response()
        .assert_status(302)
        .assert_redirect_to_route("login", &[]);
}

#[test]
fn login_redirect_chain_lands_on_the_dashboard() {
    let harness = shop_harness();
    let http = harness.fake_http();

    http.request("POST", "/login")
        .form(&[("username", "ana"), ("password", "secret")]);
    http.follow_redirects()
        .assert_status(200)
        .assert_body_same("hello ana")
        .assert_cookie("sess_id");
}

#[test]
fn logout_invalidates_the_carried_login() {
    let harness = shop_harness();
    let http = harness.fake_http();

    http.request("POST", "/login").form(&[("username", "tom")]);
    http.follow_redirects().assert_body_same("hello tom");

    http.request("GET", "/logout");
    http.follow_redirects()
        .assert_status(200)
        .assert_body_same("welcome");

    // The token is gone, so the session no longer authenticates.
    http.request("GET", "/dashboard");
    http.response().assert_status(302).assert_location("/login");
}

#[test]
fn missing_form_input_is_rejected() {
    let harness = shop_harness();
    let http = harness.fake_http();

    http.request("POST", "/login");
    http.response().assert_status(422);
}

#[test]
fn carried_cookies_yield_to_explicit_ones() {
    let harness = shop_harness();
    let http = harness.fake_http();

    http.request("GET", "/visit");
    http.response().assert_body_same("1");

    // The carried session cookie advances the counter.
    http.request("GET", "/visit");
    http.response().assert_body_same("2");

    // An explicit cookie replaces the carried one and starts fresh.
    http.request("GET", "/visit").cookie("sess_id", "elsewhere");
    http.response()
        .assert_body_same("1")
        .assert_cookie_value("sess_id", "elsewhere");
}

#[test]
fn seeded_session_state_is_visible_to_handlers() {
    let harness = shop_harness();
    let http = harness.fake_http();

    http.with_session("visits", json!(41));
    http.request("GET", "/visit");
    http.response()
        .assert_body_same("42")
        .assert_session_value("visits", &json!(42));
}

#[test]
fn json_requests_negotiate_and_round_trip() {
    let harness = shop_harness();
    let http = harness.fake_http();

    http.request("POST", "/orders")
        .json(json!({ "sku": "chair-1", "qty": 2 }));
    let response = http.response();
    response
        .assert_status(200)
        .assert_content_type("application/json")
        .assert_body_contains("placed");

    let body = response.body_json().unwrap();
    assert_eq!(body["sku"], json!("chair-1"));
}

#[test]
fn uploaded_files_reach_the_storage_disk() {
    let harness = shop_harness();
    let storage = harness.fake_file_storage();
    let http = harness.fake_http();

    let avatar = http.file_factory().create_image("avatar.png", 4, 4);
    http.request("POST", "/uploads").file("avatar", avatar);
    let response = http.response();
    response.assert_status(200);
    assert_eq!(response.body_json().unwrap()["mime"], json!("image/png"));

    storage
        .storage("uploads")
        .assert_created("avatars/avatar.png")
        .assert_exists("avatars/avatar.png")
        .assert_not_created("avatars/other.png");
}

#[test]
fn path_parameters_reach_the_handler() {
    let harness = shop_harness();
    let http = harness.fake_http();

    http.request("GET", "/profile/9");
    http.response()
        .assert_status(200)
        .assert_body_same("profile 9");
}
