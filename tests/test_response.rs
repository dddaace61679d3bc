use wallet_relay::http::request::Method;
use wallet_relay::http::response::{Response, ResponseBuilder, StatusCode};
use wallet_relay::http::writer::serialize_response;

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::OK.as_u16(), 200);
    assert_eq!(StatusCode::FOUND.as_u16(), 302);
    assert_eq!(StatusCode::METHOD_NOT_ALLOWED.as_u16(), 405);
    assert_eq!(StatusCode::BAD_GATEWAY.as_u16(), 502);
    assert_eq!(StatusCode::GATEWAY_TIMEOUT.as_u16(), 504);
}

#[test]
fn test_status_code_from_u16() {
    assert_eq!(StatusCode::from_u16(418).map(|s| s.as_u16()), Some(418));
    assert_eq!(StatusCode::from_u16(99), None);
    assert_eq!(StatusCode::from_u16(1000), None);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    assert_eq!(StatusCode::FOUND.reason_phrase(), "Found");
    assert_eq!(StatusCode::BAD_GATEWAY.reason_phrase(), "Bad Gateway");
    assert_eq!(StatusCode::from_u16(299).unwrap().reason_phrase(), "");
}

#[test]
fn test_response_builder_auto_content_length() {
    let body = b"This is the body".to_vec();
    let response = ResponseBuilder::new(StatusCode::OK).body(body.clone()).build();

    assert_eq!(
        response.headers.get("content-length").unwrap(),
        body.len().to_string()
    );
}

#[test]
fn test_response_builder_preserves_custom_content_length() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("content-length", "999")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.headers.get("Content-Length").unwrap(), "999");
    assert_eq!(response.headers.len(), 1);
}

#[test]
fn test_response_builder_no_content_length_for_bodyless_status() {
    for status in [StatusCode::NO_CONTENT, StatusCode::NOT_MODIFIED] {
        let response = ResponseBuilder::new(status).build();
        assert!(!response.headers.contains("Content-Length"));
    }
}

#[test]
fn test_response_builder_keeps_repeated_set_cookie() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Set-Cookie", "a=1")
        .header("Set-Cookie", "b=2")
        .build();

    assert_eq!(
        response.headers.get_all("set-cookie").collect::<Vec<_>>(),
        vec!["a=1", "b=2"]
    );
    assert_eq!(response.headers.len(), 3); // 2 custom + 1 auto
}

#[test]
fn test_response_builder_head_has_no_computed_content_length() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "application/json")
        .for_head()
        .build();

    assert!(!response.headers.contains("Content-Length"));
    assert_eq!(response.headers.len(), 1);
}

#[test]
fn test_response_bad_gateway_helper() {
    let response = Response::bad_gateway();

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert!(response.body.starts_with(b"502 Bad Gateway"));
    assert_eq!(response.headers.get("Content-Type"), Some("text/plain"));
}

#[test]
fn test_response_method_not_allowed_lists_methods() {
    let response = Response::method_not_allowed(&[Method::GET, Method::POST]);

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers.get("Allow"), Some("GET, POST"));
}

#[test]
fn test_serialize_response_wire_format() {
    let response = ResponseBuilder::new(StatusCode::FOUND)
        .header("Location", "https://example.com/next")
        .build();

    let wire = serialize_response(&response);

    assert_eq!(
        String::from_utf8(wire).unwrap(),
        "HTTP/1.1 302 Found\r\nLocation: https://example.com/next\r\nContent-Length: 0\r\n\r\n"
    );
}

#[test]
fn test_serialize_response_with_body() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .body(b"hi".to_vec())
        .build();

    let wire = serialize_response(&response);

    assert!(wire.ends_with(b"\r\n\r\nhi"));
    assert!(wire.starts_with(b"HTTP/1.1 200 OK\r\n"));
}

#[test]
fn test_serialize_response_keeps_latin1_header_bytes() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Disposition", "attachment; filename=\"caf\u{e9}.txt\"")
        .build();

    let wire = serialize_response(&response);

    let needle: &[u8] = b"Content-Disposition: attachment; filename=\"caf\xe9.txt\"\r\n";
    assert!(wire.windows(needle.len()).any(|w| w == needle));
}
