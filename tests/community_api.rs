mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{listing_body, TestApp};
use nyumba::users::points;

// --- Reviews ---

#[tokio::test]
async fn reviews_are_averaged_and_one_per_tenant() {
    let app = TestApp::new();
    let landlord = app.landlord().await;
    let tenant = app.tenant().await;
    let other = app.register("Wanjiru", "wanjiru@nyumba.test", "tenant").await;
    let listing = app
        .create_listing(&landlord.token, listing_body("Studio", 15000, 0))
        .await;
    let uri = format!("/api/reviews/{}", listing["id"].as_str().unwrap());

    let (status, review) = app
        .post(&uri, Some(&tenant.token), json!({ "rating": 5, "comment": " Lovely " }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(review["comment"], "Lovely");
    assert_eq!(review["userName"], "Baraka Tenant");

    let (status, body) = app
        .post(&uri, Some(&tenant.token), json!({ "rating": 1 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "You have already reviewed this listing");

    app.post(&uri, Some(&other.token), json!({ "rating": 4 }))
        .await;
    let (status, body) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["averageRating"], 4.5);

    let (status, _) = app.delete(&uri, Some(&tenant.token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.delete(&uri, Some(&tenant.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get(&uri, None).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["averageRating"], 4.0);
}

#[tokio::test]
async fn reviews_are_validated() {
    let app = TestApp::new();
    let landlord = app.landlord().await;
    let tenant = app.tenant().await;
    let listing = app
        .create_listing(&landlord.token, listing_body("Bedsitter", 8000, 0))
        .await;
    let uri = format!("/api/reviews/{}", listing["id"].as_str().unwrap());

    let (status, body) = app
        .post(&uri, Some(&landlord.token), json!({ "rating": 5 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You cannot review your own listing");

    for rating in [0, 6] {
        let (status, _) = app
            .post(&uri, Some(&tenant.token), json!({ "rating": rating }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = app
        .post(
            &uri,
            Some(&tenant.token),
            json!({ "rating": 3, "comment": "x".repeat(1001) }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/reviews/missing", Some(&tenant.token), json!({ "rating": 3 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get(&uri, None).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["averageRating"], 0.0);
}

// --- Forum ---

#[tokio::test]
async fn forum_posts_and_replies() {
    let app = TestApp::new();
    let author = app.tenant().await;
    let other = app.landlord().await;

    let (status, post) = app
        .post(
            "/api/forum/posts",
            Some(&author.token),
            json!({ "title": "Moving to Nairobi", "body": "Which estates are quiet?" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post["category"], "general");
    assert_eq!(post["authorName"], "Baraka Tenant");
    let post_id = post["id"].as_str().unwrap();

    let (status, reply) = app
        .post(
            &format!("/api/forum/posts/{post_id}/replies"),
            Some(&other.token),
            json!({ "body": "Try Lavington" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, thread) = app.get(&format!("/api/forum/posts/{post_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["replyCount"], 1);
    assert_eq!(thread["replies"][0]["body"], "Try Lavington");

    let (status, _) = app
        .put(
            &format!("/api/forum/posts/{post_id}"),
            Some(&other.token),
            json!({ "title": "Hijacked" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .put(
            &format!("/api/forum/posts/{post_id}"),
            Some(&author.token),
            json!({ "category": "Moving" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["category"], "moving");
    assert_eq!(updated["title"], "Moving to Nairobi");

    let reply_id = reply["id"].as_str().unwrap();
    let (status, _) = app
        .delete(&format!("/api/forum/replies/{reply_id}"), Some(&author.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .delete(&format!("/api/forum/replies/{reply_id}"), Some(&other.token))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .post(
            "/api/forum/posts",
            Some(&author.token),
            json!({ "title": "x".repeat(201), "body": "Too long" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admins_may_delete_any_post() {
    let app = TestApp::new();
    let author = app.tenant().await;
    let stranger = app.landlord().await;
    let admin = app.admin().await;

    let (_, post) = app
        .post(
            "/api/forum/posts",
            Some(&author.token),
            json!({ "title": "Spam", "body": "Buy now", "category": "offtopic" }),
        )
        .await;
    let uri = format!("/api/forum/posts/{}", post["id"].as_str().unwrap());

    let (status, _) = app.delete(&uri, Some(&stranger.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&uri, Some(&admin.token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, posts) = app.get("/api/forum/posts", None).await;
    assert!(posts.as_array().unwrap().is_empty());
}

// --- Rewards ---

#[tokio::test]
async fn rewards_are_managed_by_admins() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let tenant = app.tenant().await;
    let reward = json!({ "title": "Free cleaning", "pointsCost": 100 });

    let (status, body) = app
        .post("/api/rewards", Some(&tenant.token), reward.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");

    let (status, _) = app
        .post(
            "/api/rewards",
            Some(&admin.token),
            json!({ "title": "Free", "pointsCost": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = app.post("/api/rewards", Some(&admin.token), reward).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["isActive"], true);
    let uri = format!("/api/rewards/{}", created["id"].as_str().unwrap());

    let (status, updated) = app
        .put(
            &uri,
            Some(&admin.token),
            json!({ "title": "Free cleaning", "pointsCost": 80, "isActive": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["pointsCost"], 80);

    // Inactive rewards drop out of the public catalogue.
    let (_, list) = app.get("/api/rewards", None).await;
    assert!(list.as_array().unwrap().is_empty());

    let (status, _) = app.delete(&uri, Some(&admin.token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.delete(&uri, Some(&admin.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn redeeming_spends_points() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let tenant = app.tenant().await;
    let (_, reward) = app
        .post(
            "/api/rewards",
            Some(&admin.token),
            json!({ "title": "Moving van", "pointsCost": 60 }),
        )
        .await;
    let redeem = format!("/api/rewards/{}/redeem", reward["id"].as_str().unwrap());

    let (status, body) = app.post(&redeem, Some(&tenant.token), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Insufficient points");

    {
        let conn = app.pool().get().unwrap();
        points::credit(&conn, &tenant.id, 100, "bonus").unwrap();
    }

    let (status, body) = app.post(&redeem, Some(&tenant.token), json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["pointsSpent"], 60);
    assert_eq!(body["points"], 40);

    let (status, body) = app.post(&redeem, Some(&tenant.token), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Insufficient points");

    let (_, body) = app.get("/api/users/points", Some(&tenant.token)).await;
    assert_eq!(body["points"], 40);
    let reasons: Vec<&str> = body["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["reason"].as_str().unwrap())
        .collect();
    assert!(reasons.contains(&"redeem"));
}

// --- Ads ---

#[tokio::test]
async fn ads_are_public_and_admin_managed() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let tenant = app.tenant().await;

    let (status, _) = app
        .post("/api/ads", Some(&tenant.token), json!({ "title": "Movers" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, ad) = app
        .post(
            "/api/ads",
            Some(&admin.token),
            json!({ "title": "Movers", "targetUrl": "https://movers.example", "imageUrl": "  " }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(ad["imageUrl"].is_null());
    let uri = format!("/api/ads/{}", ad["id"].as_str().unwrap());

    let (status, ads) = app.get("/api/ads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ads.as_array().unwrap().len(), 1);

    let (status, updated) = app
        .put(
            &uri,
            Some(&admin.token),
            json!({ "title": "Movers KE", "isActive": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Movers KE");
    assert!(updated["targetUrl"].is_null());
    let (_, ads) = app.get("/api/ads", None).await;
    assert!(ads.as_array().unwrap().is_empty());

    let (status, _) = app.delete(&uri, Some(&admin.token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
