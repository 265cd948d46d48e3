// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account deletion tests.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

mod common;
use common::{body_json, create_test_app, USER_ID};

#[tokio::test]
async fn test_delete_account_removes_everything() {
    let app = create_test_app().await;
    let cookie = app.sign_in().await;

    let created = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/playlists")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "mood": "chill" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/account")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let removal = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(removal.starts_with("moodmix_session="));
    assert!(removal.contains("Max-Age=0"));

    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    assert!(app.state.db.get_user(USER_ID).await.unwrap().is_none());
    assert!(app.state.db.get_tokens(USER_ID).await.unwrap().is_none());
    assert!(app
        .state
        .db
        .list_playlists_for_user(USER_ID)
        .await
        .unwrap()
        .is_empty());

    // Deleting the account never touches the playlist on Spotify
    assert!(!app.spotify.state.called("DELETE"));
}

#[tokio::test]
async fn test_requests_after_deletion_need_new_login() {
    let app = create_test_app().await;
    let cookie = app.sign_in().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/account")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // An old cookie still verifies, but there are no tokens behind it
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/recommendations")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "mood": "happy" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "auth_error");
}

#[tokio::test]
async fn test_revoke_local_tokens_invalidates_cache() {
    let app = create_test_app().await;
    app.sign_in().await;

    let token = app
        .state
        .spotify
        .get_valid_access_token(USER_ID)
        .await
        .unwrap();
    assert_eq!(token, common::ACCESS_1);

    let had_tokens = app
        .state
        .spotify
        .revoke_local_tokens(USER_ID)
        .await
        .unwrap();
    assert!(had_tokens);

    let result = app.state.spotify.get_valid_access_token(USER_ID).await;
    assert!(
        result.is_err_and(|e| e.requires_reauth()),
        "Should fail as tokens are gone from store and cache"
    );
}
