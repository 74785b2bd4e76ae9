#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::middleware::csrf::CSRF_HEADER;
    use crate::routes;
    use crate::state::AppState;
    use crate::tests::test_state;

    async fn setup_test_app() -> (Router, AppState) {
        let state = test_state().await;
        (routes::router(state.clone()), state)
    }

    fn valid_payload(email: &str) -> Value {
        json!({
            "email": email,
            "password": "Str0ng!Passw0rd",
            "first_name": "Janeliese",
            "last_name": "Hendricksen",
        })
    }

    fn json_request(method: Method, token: Option<&str>, client: &str, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri("/api/register")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", client);
        if let Some(token) = token {
            builder = builder.header(CSRF_HEADER, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_successful_registration() {
        let (app, state) = setup_test_app().await;
        let token = state.gate.csrf().issue();

        let response =
            send(&app, json_request(Method::POST, Some(&token), "10.0.0.1", &valid_payload("jane@example.com")))
                .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-frame-options"], "Deny");
        let json = body_json(response).await;
        assert_eq!(json["message"], "Registration successful!");
        assert!(json["user_id"].as_i64().unwrap() > 0);

        let snapshot = state.metrics.get_snapshot();
        assert_eq!(snapshot.registrations_created, 1);
        assert_eq!(snapshot.admitted, 1);
    }

    #[tokio::test]
    async fn test_apostrophe_names_are_accepted_and_stored_escaped() {
        let (app, state) = setup_test_app().await;
        let token = state.gate.csrf().issue();
        let mut payload = valid_payload("oneil@example.com");
        payload["first_name"] = json!("  Mary-Jane O'Neil  ");

        let response = send(&app, json_request(Method::POST, Some(&token), "10.0.0.2", &payload)).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let (first_name, password): (String, String) =
            sqlx::query_as("SELECT first_name, password FROM users WHERE email = ?1")
                .bind("oneil@example.com")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(first_name, "Mary-Jane O&#x27;Neil");
        assert!(state.hasher.verify("Str0ng!Passw0rd", &password));
        assert!(!password.contains("Str0ng"));
    }

    #[tokio::test]
    async fn test_markup_in_names_is_rejected() {
        let (app, state) = setup_test_app().await;
        let token = state.gate.csrf().issue();
        let mut payload = valid_payload("markup@example.com");
        payload["last_name"] = json!("<b>Hendricksen</b>");

        let response = send(&app, json_request(Method::POST, Some(&token), "10.0.0.7", &payload)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["details"]["fields"]["last_name"][0], "Name contains invalid characters");
        assert!(json["error"]["details"]["fields"].get("first_name").is_none());
    }

    #[tokio::test]
    async fn test_multipart_registration_with_token_field() {
        let (app, state) = setup_test_app().await;
        let token = state.gate.csrf().issue();
        let mut body = String::new();
        for (name, value) in [
            ("csrfmiddlewaretoken", token.as_str()),
            ("email", "multi@example.com"),
            ("password", "Str0ng!Passw0rd"),
            ("first_name", "Janeliese"),
            ("last_name", "Hendricksen"),
        ] {
            body.push_str(&format!(
                "--FORMBOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                name, value
            ));
        }
        body.push_str("--FORMBOUNDARY--\r\n");

        let response = send(
            &app,
            Request::builder()
                .method(Method::POST)
                .uri("/api/register")
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=FORMBOUNDARY")
                .header("x-forwarded-for", "10.0.0.8")
                .body(Body::from(body))
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(crate::db::user_exists(&state.db, "multi@example.com").await.unwrap());
        assert_eq!(state.metrics.get_snapshot().csrf_missing, 0);
    }

    #[tokio::test]
    async fn test_form_body_with_token_field() {
        let (app, state) = setup_test_app().await;
        let token = state.gate.csrf().issue();
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("csrfmiddlewaretoken", &token)
            .append_pair("email", "form@example.com")
            .append_pair("password", "Str0ng!Passw0rd")
            .append_pair("first_name", "Janeliese")
            .append_pair("last_name", "Hendricksen")
            .finish();

        let response = send(
            &app,
            Request::builder()
                .method(Method::POST)
                .uri("/api/register/")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_missing_csrf_token() {
        let (app, state) = setup_test_app().await;

        let response =
            send(&app, json_request(Method::POST, None, "10.0.0.3", &valid_payload("a@example.com"))).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().contains_key("strict-transport-security"));
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "CSRF_TOKEN_MISSING");
        assert_eq!(state.metrics.get_snapshot().csrf_missing, 1);
    }

    #[tokio::test]
    async fn test_invalid_and_expired_csrf_tokens() {
        let (app, state) = setup_test_app().await;
        let expired = state.gate.csrf().issue_at(chrono::Utc::now().timestamp() - 86_401);
        let mut tampered = state.gate.csrf().issue();
        tampered.push('0');

        for token in [expired.as_str(), tampered.as_str(), "garbage"] {
            let response =
                send(&app, json_request(Method::POST, Some(token), "10.0.0.4", &valid_payload("b@example.com")))
                    .await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "CSRF_TOKEN_INVALID");
            // the rejected token is never echoed back
            assert!(!json.to_string().contains(token));
        }
        assert_eq!(state.metrics.get_snapshot().csrf_invalid, 3);
    }

    #[tokio::test]
    async fn test_validation_errors_are_collected() {
        let (app, state) = setup_test_app().await;
        let token = state.gate.csrf().issue();
        let payload = json!({
            "email": "not-an-email",
            "password": "short",
            "first_name": "Jo3",
        });

        let response = send(&app, json_request(Method::POST, Some(&token), "10.0.0.5", &payload)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        let fields = &json["error"]["details"]["fields"];
        assert_eq!(fields["email"][0], "Invalid email format!");
        assert_eq!(fields["last_name"][0], "last_name is required!");
        assert_eq!(fields["first_name"][0], "Name contains invalid characters");
        assert!(fields["password"].as_array().unwrap().len() >= 3);
        assert_eq!(state.metrics.get_snapshot().validation_failures, 1);
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let (app, state) = setup_test_app().await;
        let token = state.gate.csrf().issue();

        let response = send(
            &app,
            Request::builder()
                .method(Method::POST)
                .uri("/api/register")
                .header(header::CONTENT_TYPE, "application/json")
                .header(CSRF_HEADER, token)
                .body(Body::from("{\"email\":"))
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "MALFORMED_INPUT");
        assert_eq!(state.metrics.get_snapshot().malformed_bodies, 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflict() {
        let (app, state) = setup_test_app().await;
        let token = state.gate.csrf().issue();
        let payload = valid_payload("dup@example.com");

        let first = send(&app, json_request(Method::POST, Some(&token), "10.0.0.6", &payload)).await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = send(&app, json_request(Method::POST, Some(&token), "10.0.0.6", &payload)).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let json = body_json(second).await;
        assert_eq!(json["error"]["code"], "CONFLICT");
        assert_eq!(json["error"]["details"]["email"], "User already exists!");
        assert_eq!(state.metrics.get_snapshot().conflicts, 1);
    }

    #[tokio::test]
    async fn test_eleventh_request_is_rate_limited() {
        let (app, state) = setup_test_app().await;
        let payload = valid_payload("rl@example.com");

        // rate limiting runs before CSRF, so tokenless requests still count
        for _ in 0..10 {
            let response = send(&app, json_request(Method::POST, None, "192.0.2.10", &payload)).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
        let response = send(&app, json_request(Method::POST, None, "192.0.2.10", &payload)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
        assert!(retry_after > 0 && retry_after <= 60);
        assert!(response.headers().contains_key("x-content-type-options"));
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "RATE_LIMITED");

        // another client is unaffected
        let token = state.gate.csrf().issue();
        let other = send(&app, json_request(Method::POST, Some(&token), "192.0.2.11", &payload)).await;
        assert_eq!(other.status(), StatusCode::CREATED);
        assert_eq!(state.metrics.get_snapshot().rate_limited, 1);
    }

    #[tokio::test]
    async fn test_options_preflight_skips_csrf() {
        let (app, state) = setup_test_app().await;

        let response = send(
            &app,
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/register")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type, X-CSRFToken");
        assert_eq!(headers["x-xss-protection"], "1; mode=block");
        assert_eq!(state.metrics.get_snapshot().csrf_missing, 0);
    }

    #[tokio::test]
    async fn test_options_counts_against_rate_limit() {
        let (app, _) = setup_test_app().await;

        for i in 0..11 {
            let response = send(
                &app,
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/register")
                    .header("x-real-ip", "198.51.100.20")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
            let expected = if i < 10 { StatusCode::OK } else { StatusCode::TOO_MANY_REQUESTS };
            assert_eq!(response.status(), expected, "request {}", i + 1);
        }
    }

    #[tokio::test]
    async fn test_unsupported_methods_are_rejected_before_the_gate() {
        let (app, state) = setup_test_app().await;

        for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
            for _ in 0..3 {
                let response = send(
                    &app,
                    Request::builder()
                        .method(method.clone())
                        .uri("/api/register")
                        .header("x-forwarded-for", "203.0.113.30")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await;
                assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
                assert_eq!(response.headers()[header::ALLOW], "POST, OPTIONS");
            }
        }

        // twelve rejected requests consumed no quota
        let response =
            send(&app, json_request(Method::POST, None, "203.0.113.30", &valid_payload("m@example.com"))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(state.metrics.get_snapshot().rate_limited, 0);
    }

    #[tokio::test]
    async fn test_csrf_token_endpoint() {
        let (app, state) = setup_test_app().await;

        let response = send(
            &app,
            Request::builder().uri("/api/csrf-token").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let json = body_json(response).await;
        let token = json["csrf_token"].as_str().unwrap();
        assert_eq!(token.split(':').count(), 3);
        assert!(state.gate.csrf().verify(token));
        assert_eq!(state.metrics.get_snapshot().tokens_issued, 1);
    }
}
