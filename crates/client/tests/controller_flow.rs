use std::sync::Arc;

use emphub_api::app::{build_app, services::{AppServices, EmployeeService}};
use emphub_client::{ClientConfig, EmployeeApiClient, EmployeeController, EmployeeForm, Page};
use emphub_client::controller::SAVE_FAILED_MESSAGE;
use emphub_infra::InMemoryEmployeeStore;
use emphub_messaging::{InMemoryServiceBus, ServiceBusHelper};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let bus = InMemoryServiceBus::new();
        bus.create_topic("employees").unwrap();
        bus.create_subscription("employees", "hr").unwrap();
        let services = AppServices::new(EmployeeService::new(
            Arc::new(InMemoryEmployeeStore::new()),
            ServiceBusHelper::new(Arc::new(bus)),
            "employees",
        ));

        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn controller(&self) -> EmployeeController {
        EmployeeController::new(EmployeeApiClient::new(&ClientConfig::new(&self.base_url)))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A port nothing listens on.
async fn dead_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn filled_form() -> EmployeeForm {
    EmployeeForm {
        name: "A".into(),
        email: "a@b.com".into(),
        department: "IT".into(),
        hire_date: "2024-01-01".into(),
        salary: "50000.00".into(),
        phone_number: "+15551234567".into(),
    }
}

#[tokio::test]
async fn echo_round_trips() {
    let server = TestServer::spawn().await;
    let api = EmployeeApiClient::new(&ClientConfig::new(&server.base_url));
    assert_eq!(api.echo().await.unwrap(), "Echo from server.");
}

#[tokio::test]
async fn save_then_index_shows_the_new_employee() {
    let server = TestServer::spawn().await;
    let controller = server.controller();

    assert!(controller.index().await.employees.is_empty());
    assert_eq!(controller.save(filled_form()).await, Page::Redirect("/".into()));

    let model = controller.index().await;
    assert_eq!(model.employees.len(), 1);
    assert_eq!(model.employees[0].name(), "A");
    assert_eq!(model.employees[0].email().as_str(), "a@b.com");
    assert!(model.errors.is_empty());
}

#[tokio::test]
async fn invalid_form_renders_errors_without_calling_create() {
    let server = TestServer::spawn().await;
    let controller = server.controller();

    let form = EmployeeForm {
        email: "broken".into(),
        ..filled_form()
    };
    match controller.save(form.clone()).await {
        Page::Render(model) => {
            assert_eq!(model.form, form);
            assert!(model.errors.iter().any(|e| e.field == "email"));
            assert!(model.message.is_none());
        }
        other => panic!("expected render, got {other:?}"),
    }
    assert!(controller.index().await.employees.is_empty());
}

#[tokio::test]
async fn unreachable_api_degrades_to_empty_list_and_generic_error() {
    let controller =
        EmployeeController::new(EmployeeApiClient::new(&ClientConfig::new(dead_base_url().await)));

    let model = controller.index().await;
    assert!(model.employees.is_empty());
    assert!(model.errors.is_empty());

    match controller.save(filled_form()).await {
        Page::Render(model) => {
            assert!(model.employees.is_empty());
            assert_eq!(model.message.as_deref(), Some(SAVE_FAILED_MESSAGE));
        }
        other => panic!("expected render, got {other:?}"),
    }
}

#[tokio::test]
async fn clear_redirects_home() {
    let controller =
        EmployeeController::new(EmployeeApiClient::new(&ClientConfig::new(dead_base_url().await)));
    assert_eq!(controller.clear(), Page::Redirect("/".into()));
}
