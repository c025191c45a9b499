//! Common test utilities for integration tests.

#![allow(dead_code)]

use effigy_core::auth::User;
use effigy_core::events::Event;
use effigy_core::mail::Message;
use effigy_core::notifier::{Notification, Recipient};
use effigy_core::queue::Job;
use effigy_core::{App, Guard, Reply, Result, Route, RunCx};
use effigy_harness::Harness;
use serde_json::json;
use std::path::Path;

/// A small shop application touching every collaborator the harness can
/// fake: sessions, auth, events, queues, mail, notifications and file
/// storage. Tokens live on disk so logins survive context forks.
pub fn shop_app(root: &Path) -> Result<App> {
    App::builder()
        .root(root)
        .config_value("auth.token_storage", json!("storage"))
        .config_value("queue.queues", json!(["orders"]))
        .config_value("mail.mailers", json!(["orders"]))
        .config_value("notifier.channels", json!(["mail", "sms"]))
        .config_value("storage.storages", json!(["uploads"]))
        .routes(|r| {
            r.add(Route::get("/", |_| Ok(Reply::Text("welcome".into()))));
            r.add(
                Route::get("/login", |_| Ok(Reply::Text("please sign in".into()))).named("login"),
            );
            r.add(Route::post("/login", sign_in));
            r.add(
                Route::get("/dashboard", |cx| {
                    let name = cx
                        .auth()
                        .current()
                        .map(|a| a.user.username)
                        .unwrap_or_default();
                    Ok(Reply::Text(format!("hello {name}")))
                })
                .named("dashboard")
                .guarded(Guard::Authenticated {
                    redirect: Some("/login".to_string()),
                }),
            );
            r.add(Route::get("/logout", |cx| {
                cx.logout()?;
                Ok(Reply::Redirect("/".into()))
            }));
            r.add(
                Route::get("/profile/{id}", |cx| {
                    Ok(Reply::Text(format!(
                        "profile {}",
                        cx.param("id").unwrap_or_default()
                    )))
                })
                .named("profile"),
            );
            r.add(Route::get("/visit", count_visit));
            r.add(Route::post("/orders", place_order));
            r.add(Route::post("/orders/{id}/ship", ship_order));
            r.add(Route::post("/uploads", store_upload));
        })
        .build()
}

/// A harness over the shop application.
pub fn shop_harness() -> Harness {
    Harness::new(shop_app).unwrap()
}

fn sign_in(cx: &RunCx) -> Result<Reply> {
    let Some(username) = cx.request().form_value("username").map(str::to_string) else {
        return Ok(Reply::Status(422));
    };
    cx.login(User::new(7, username))?;
    Ok(Reply::Redirect("/dashboard".into()))
}

fn count_visit(cx: &RunCx) -> Result<Reply> {
    let session = cx.session();
    let count = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
    session.set("visits", json!(count));
    Ok(Reply::Text(count.to_string()))
}

/// Dispatches the domain event, queues the processing job and mails a
/// confirmation.
fn place_order(cx: &RunCx) -> Result<Reply> {
    let Some(order) = cx.request().body_json() else {
        return Ok(Reply::Status(422));
    };
    let app = cx.app();
    app.events()?
        .dispatch(Event::new("order.placed", order.clone()));
    app.queues()?
        .queue("orders")?
        .push(Job::new("process-order", order.clone()))?;
    app.mailers()?.mailer("orders")?.send(
        Message::new("order_confirmation")
            .from("shop@example.com")
            .to("buyer@example.com")
            .subject("Order received")
            .text("Thanks for your order."),
    )?;
    Ok(Reply::Json(
        json!({ "status": "placed", "sku": order.get("sku") }),
    ))
}

fn ship_order(cx: &RunCx) -> Result<Reply> {
    let notification = Notification::new("order_shipped")
        .subject("Your order shipped")
        .channels(["mail"]);
    cx.app()
        .notifier()?
        .send(&notification, &[Recipient::new().email("buyer@example.com")])?;
    Ok(Reply::Text("shipped".into()))
}

fn store_upload(cx: &RunCx) -> Result<Reply> {
    let Some(file) = cx.request().file("avatar") else {
        return Ok(Reply::Status(422));
    };
    let path = format!("avatars/{}", file.filename);
    cx.app()
        .storages()?
        .storage("uploads")?
        .write(&path, &file.content)?;
    Ok(Reply::Json(json!({
        "path": path,
        "bytes": file.size(),
        "mime": file.mime,
    })))
}
