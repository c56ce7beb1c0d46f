use super::*;

pub(super) async fn access_log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();
    let status = response.status();

    info!(
        "{} {} {} {} {}ms",
        category_access(),
        method_label(method.as_str()),
        status_label(status.as_u16()),
        uri,
        elapsed_ms
    );

    response
}

pub(super) async fn healthz_handler() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

pub(super) async fn get_manager_address_handler(
    State(state): State<GatewayState>,
) -> Result<Response, GatewayError> {
    let address = state.gateway.manager().await?;
    Ok(plain_text(address))
}

pub(super) async fn set_manager_address_handler(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request: ManagerAddressRequest = parse_body(&body)?;
    let address = state.gateway.set_manager(request.ip).await;
    Ok(plain_text(address))
}

pub(super) async fn selection_handler(State(state): State<GatewayState>) -> Json<SelectionResponse> {
    let selection = state.gateway.selection().await;
    Json(SelectionResponse {
        phase: selection.phase(),
        selection,
    })
}

pub(super) async fn list_devices_handler(
    State(state): State<GatewayState>,
) -> Result<Json<DeviceListResponse>, GatewayError> {
    let devices = state.gateway.list_devices().await?;
    Ok(Json(DeviceListResponse { devices }))
}

pub(super) async fn select_device_handler(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    let request: SelectDeviceRequest = parse_body(&body)?;
    state
        .gateway
        .select_device(DeviceSelection {
            id: request.id,
            host: request.host,
            port: request.port,
        })
        .await?;
    Ok(StatusCode::OK)
}

pub(super) async fn get_device_handler(
    State(state): State<GatewayState>,
) -> Result<Json<AgentDetail>, GatewayError> {
    Ok(Json(state.gateway.selected_device_detail().await?))
}

pub(super) async fn list_apps_handler(
    State(state): State<GatewayState>,
) -> Result<Json<AppListing>, GatewayError> {
    Ok(Json(state.gateway.list_applications().await?))
}

pub(super) async fn reconcile_apps_handler(
    State(state): State<GatewayState>,
) -> Result<Json<ReconcileReport>, GatewayError> {
    Ok(Json(state.gateway.reconcile_applications().await?))
}

pub(super) async fn select_app_handler(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    let request: SelectAppRequest = parse_body(&body)?;
    state.gateway.select_application(request.id).await?;
    Ok(StatusCode::OK)
}

pub(super) async fn delete_app_handler(
    State(state): State<GatewayState>,
) -> Result<StatusCode, GatewayError> {
    state.gateway.delete_application().await?;
    Ok(StatusCode::OK)
}

pub(super) async fn install_app_handler(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    let request: InstallAppRequest = parse_body(&body)?;
    state
        .gateway
        .install_application(request.name, payload_text(request.data))
        .await?;
    Ok(StatusCode::OK)
}

pub(super) async fn start_app_handler(
    State(state): State<GatewayState>,
) -> Result<StatusCode, GatewayError> {
    run_app_action(&state, AppAction::Start).await
}

pub(super) async fn stop_app_handler(
    State(state): State<GatewayState>,
) -> Result<StatusCode, GatewayError> {
    run_app_action(&state, AppAction::Stop).await
}

pub(super) async fn update_app_handler(
    State(state): State<GatewayState>,
) -> Result<StatusCode, GatewayError> {
    run_app_action(&state, AppAction::Update).await
}

async fn run_app_action(state: &GatewayState, action: AppAction) -> Result<StatusCode, GatewayError> {
    state.gateway.app_action(action).await?;
    Ok(StatusCode::OK)
}

pub(super) async fn get_app_document_handler(
    State(state): State<GatewayState>,
) -> Result<Json<Value>, GatewayError> {
    Ok(Json(state.gateway.application_document().await?))
}

pub(super) async fn set_app_document_handler(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    let request: AppDocumentRequest = parse_body(&body)?;
    state
        .gateway
        .set_application_document(payload_text(request.data))
        .await?;
    Ok(StatusCode::OK)
}

pub(super) async fn get_templates_handler(
    State(state): State<GatewayState>,
) -> Result<Json<TemplateRegistry>, GatewayError> {
    Ok(Json(state.gateway.templates()?))
}

pub(super) async fn append_template_handler(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    let template: Value = parse_body(&body)?;
    state.gateway.append_template(template).await?;
    Ok(StatusCode::OK)
}

pub(super) async fn register_device_handler(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<StatusCode, GatewayError> {
    let request: RegisterDeviceRequest = parse_body(&body)?;
    state
        .gateway
        .register_device(request.ip, request.interval)
        .await?;
    Ok(StatusCode::OK)
}

pub(super) async fn unregister_device_handler(
    State(state): State<GatewayState>,
) -> Result<StatusCode, GatewayError> {
    state.gateway.unregister_device().await?;
    Ok(StatusCode::OK)
}

fn plain_text(text: String) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
        .into_response()
}
