// tests/post_tests.rs

mod common;

use common::spawn_app;
use serde_json::{Value, json};

const CONTENT: &str = "Long enough body text";

#[tokio::test]
async fn title_length_boundary() {
    let app = spawn_app().await;
    let user = app.register("t").await;

    let short = app
        .client
        .post(app.url("/api/posts"))
        .bearer_auth(&user.token)
        .json(&json!({ "title": "abcd", "content": CONTENT, "category": "tech" }))
        .send()
        .await
        .unwrap();
    assert_eq!(short.status().as_u16(), 400);
    let body: Value = short.json().await.unwrap();
    assert_eq!(body["errors"][0]["field"], "title");

    let ok = app
        .client
        .post(app.url("/api/posts"))
        .bearer_auth(&user.token)
        .json(&json!({
            "title": "abcde",
            "content": CONTENT,
            "category": "tech",
            "tags": ["rust"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status().as_u16(), 201);
    let body: Value = ok.json().await.unwrap();
    assert_eq!(body["data"]["title"], "abcde");
    assert_eq!(body["data"]["tags"][0], "rust");
    assert_eq!(body["data"]["author"]["username"], user.username.as_str());
}

#[tokio::test]
async fn creating_a_post_requires_auth() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/posts"))
        .json(&json!({ "title": "Valid title", "content": CONTENT, "category": "tech" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn unknown_category_is_rejected() {
    let app = spawn_app().await;
    let user = app.register("c").await;

    let response = app
        .client
        .post(app.url("/api/posts"))
        .bearer_auth(&user.token)
        .json(&json!({ "title": "Valid title", "content": CONTENT, "category": "news" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn reading_a_post_counts_views() {
    let app = spawn_app().await;
    let user = app.register("v").await;
    let id = app.create_post(&user.token, "Viewed post", CONTENT).await;

    let (status, first) = app.get_json(&format!("/api/posts/{}", id), None).await;
    assert_eq!(status, 200);
    assert_eq!(first["data"]["views_count"], 1);

    let (_, second) = app.get_json(&format!("/api/posts/{}", id), None).await;
    assert_eq!(second["data"]["views_count"], 2);

    let (status, _) = app.get_json("/api/posts/999999", None).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn only_owner_or_admin_may_modify() {
    let app = spawn_app().await;
    let owner = app.register("own").await;
    let other = app.register("oth").await;
    let admin = app.admin().await;
    let id = app.create_post(&owner.token, "Owned post", CONTENT).await;

    let edit = app
        .client
        .put(app.url(&format!("/api/posts/{}", id)))
        .bearer_auth(&other.token)
        .json(&json!({ "title": "Hijacked title" }))
        .send()
        .await
        .unwrap();
    assert_eq!(edit.status().as_u16(), 403);

    let delete = app
        .client
        .delete(app.url(&format!("/api/posts/{}", id)))
        .bearer_auth(&other.token)
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status().as_u16(), 403);

    let owner_edit = app
        .client
        .put(app.url(&format!("/api/posts/{}", id)))
        .bearer_auth(&owner.token)
        .json(&json!({ "title": "Renamed by owner" }))
        .send()
        .await
        .unwrap();
    assert_eq!(owner_edit.status().as_u16(), 200);
    let body: Value = owner_edit.json().await.unwrap();
    assert_eq!(body["data"]["title"], "Renamed by owner");
    assert_eq!(body["data"]["content"], CONTENT);

    let admin_delete = app
        .client
        .delete(app.url(&format!("/api/posts/{}", id)))
        .bearer_auth(&admin.token)
        .send()
        .await
        .unwrap();
    assert_eq!(admin_delete.status().as_u16(), 200);

    let (status, _) = app.get_json(&format!("/api/posts/{}", id), None).await;
    assert_eq!(status, 404);

    let (_, profile) = app
        .get_json(&format!("/api/users/{}", owner.username), None)
        .await;
    assert_eq!(profile["data"]["posts_count"], 0);
}

#[tokio::test]
async fn pinning_is_admin_only_and_pinned_posts_lead() {
    let app = spawn_app().await;
    let user = app.register("pin").await;
    let admin = app.admin().await;

    let old = app.create_post(&user.token, "Older post", CONTENT).await;
    let newer = app.create_post(&user.token, "Newer post", CONTENT).await;

    let denied = app
        .client
        .put(app.url(&format!("/api/posts/{}", old)))
        .bearer_auth(&user.token)
        .json(&json!({ "is_pinned": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status().as_u16(), 403);

    let pinned = app
        .client
        .put(app.url(&format!("/api/posts/{}", old)))
        .bearer_auth(&admin.token)
        .json(&json!({ "is_pinned": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(pinned.status().as_u16(), 200);

    let (_, body) = app.get_json("/api/posts", None).await;
    let ids: Vec<i64> = body["data"]["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![old, newer]);

    let (_, body) = app.get_json("/api/posts?sort_by=is_pinned&sort_order=asc", None).await;
    assert_eq!(body["data"]["posts"][0]["id"], newer);
}

#[tokio::test]
async fn double_like_toggle_restores_state() {
    let app = spawn_app().await;
    let author = app.register("auth").await;
    let fan = app.register("fan").await;
    let id = app.create_post(&author.token, "Likeable post", CONTENT).await;

    let like = |token: String| {
        let request = app
            .client
            .post(app.url(&format!("/api/posts/{}/like", id)))
            .bearer_auth(token);
        async move { request.send().await.unwrap().json::<Value>().await.unwrap() }
    };

    let first = like(fan.token.clone()).await;
    assert_eq!(first["data"]["is_liked"], true);
    assert_eq!(first["data"]["likes_count"], 1);

    let (_, listed) = app.get_json("/api/posts", Some(&fan.token)).await;
    assert_eq!(listed["data"]["posts"][0]["is_liked_by_user"], true);
    let (_, anonymous) = app.get_json("/api/posts", None).await;
    assert_eq!(anonymous["data"]["posts"][0]["is_liked_by_user"], false);

    let (_, profile) = app
        .get_json(&format!("/api/users/{}", author.username), None)
        .await;
    assert_eq!(profile["data"]["likes_received"], 1);

    let second = like(fan.token.clone()).await;
    assert_eq!(second["data"]["is_liked"], false);
    assert_eq!(second["data"]["likes_count"], 0);

    let (_, post) = app.get_json(&format!("/api/posts/{}", id), Some(&fan.token)).await;
    assert_eq!(post["data"]["likes_count"], 0);
    assert_eq!(post["data"]["is_liked_by_user"], false);

    let (_, profile) = app
        .get_json(&format!("/api/users/{}", author.username), None)
        .await;
    assert_eq!(profile["data"]["likes_received"], 0);
}

#[tokio::test]
async fn search_requires_every_term() {
    let app = spawn_app().await;
    let user = app.register("s").await;

    let both = app
        .create_post(&user.token, "Alpha release notes", "Now with BETA support")
        .await;
    app.create_post(&user.token, "Only alpha here", "Nothing else to report")
        .await;
    app.create_post(&user.token, "Only the other one", "Beta without the first word")
        .await;

    let (status, body) = app.get_json("/api/posts/search?q=alpha%20beta", None).await;
    assert_eq!(status, 200);
    let posts = body["data"]["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["id"], both);
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (_, by_author) = app
        .get_json(
            &format!("/api/posts/search?author={}", &user.username[..3]),
            None,
        )
        .await;
    assert_eq!(by_author["data"]["pagination"]["total"], 3);

    let (_, no_author) = app.get_json("/api/posts/search?author=zzzz_nobody", None).await;
    assert_eq!(no_author["data"]["pagination"]["total"], 0);
}

#[tokio::test]
async fn numeric_author_matches_id_or_username_digits() {
    let app = spawn_app().await;
    let dated = app.register("bob2024").await;
    let other = app.register("al").await;
    let dated_post = app
        .create_post(&dated.token, "Dated author", "Posted by a dated name")
        .await;
    let other_post = app
        .create_post(&other.token, "Other author", "Posted by someone else")
        .await;

    let (status, body) = app.get_json("/api/posts/search?author=2024", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["posts"][0]["id"], dated_post);

    let (_, by_id) = app
        .get_json(&format!("/api/posts/search?author={}", other.id), None)
        .await;
    let ids: Vec<i64> = by_id["data"]["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert!(ids.contains(&other_post));
}

#[tokio::test]
async fn search_needs_a_criterion_and_valid_sort() {
    let app = spawn_app().await;

    let (status, body) = app.get_json("/api/posts/search", None).await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "error");

    let (status, _) = app.get_json("/api/posts/search?q=x&sort_by=bogus", None).await;
    assert_eq!(status, 400);

    let (status, _) = app.get_json("/api/posts/search?q=x&limit=51", None).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn relevance_prefers_title_matches() {
    let app = spawn_app().await;
    let user = app.register("r").await;

    let in_content = app
        .create_post(&user.token, "Something else", "Talking about rust here")
        .await;
    let in_title = app
        .create_post(&user.token, "Rust ownership", "A post about borrowing")
        .await;

    let (_, body) = app
        .get_json("/api/posts/search?q=rust&sort_by=relevance", None)
        .await;
    let ids: Vec<i64> = body["data"]["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![in_title, in_content]);
}

#[tokio::test]
async fn list_filters_by_category_and_paginates() {
    let app = spawn_app().await;
    let user = app.register("l").await;
    for i in 0..3 {
        app.create_post(&user.token, &format!("Tech post {}", i), CONTENT)
            .await;
    }
    app.client
        .post(app.url("/api/posts"))
        .bearer_auth(&user.token)
        .json(&json!({ "title": "Life post", "content": CONTENT, "category": "life" }))
        .send()
        .await
        .unwrap();

    let (_, body) = app.get_json("/api/posts?category=life", None).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (_, body) = app.get_json("/api/posts?category=tech&limit=2&page=2", None).await;
    let pagination = &body["data"]["pagination"];
    assert_eq!(pagination["total"], 3);
    assert_eq!(pagination["pages"], 2);
    assert_eq!(pagination["current"], 2);
    assert_eq!(pagination["has_next"], false);
    assert_eq!(pagination["has_prev"], true);
    assert_eq!(body["data"]["posts"].as_array().unwrap().len(), 1);

    let (status, _) = app.get_json("/api/posts?page=0", None).await;
    assert_eq!(status, 400);
}
