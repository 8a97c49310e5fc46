use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

use opsdesk_remote::{RemoteError, RpcRequest, RpcResponse, Transport};

/// A scripted failure for the next call to one sub-action.
#[derive(Debug, Clone)]
pub enum Failure {
    Network,
    Rejected(String),
}

/// Holds calls to one sub-action until released.
pub struct Gate {
    sub_action: String,
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Resolves once a held call has arrived.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
struct BackendState {
    orders: Vec<Map<String, Value>>,
    products: Vec<Map<String, Value>>,
    next_order: u64,
    next_product: u64,
    failures: HashMap<String, VecDeque<Failure>>,
    failing_uploads: HashSet<String>,
    calls: Vec<RpcRequest>,
}

/// In-memory stand-in for the console's remote endpoint. Understands the
/// default sub-actions and keeps a log of every request it saw.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two orders (`ORD-1` pending with one item line, `ORD-2` completed) and two products (`P1`, `P2`).
    pub fn seeded() -> Self {
        let backend = Self::new();
        backend.insert_order(json!({
            "orderId": "ORD-1",
            "status": "待處理",
            "customerName": "林小姐",
            "customerPhone": "0912345678",
            "items": [
                { "name": "Snail Toner", "spec": "150ml", "qty": 2, "price": 450, "subtotal": 900 },
            ],
            "shippingFee": 60,
            "total": 960,
        }));
        backend.insert_order(json!({
            "orderId": "ORD-2",
            "status": "已完成",
            "customerName": "Chen",
            "customerPhone": "0988123456",
            "total": 450,
        }));
        backend.insert_product(json!({
            "id": "P1",
            "name": "Snail Toner",
            "brand": "COSRX",
            "category": "toner",
            "price": 450,
            "image": "https://cdn.example/COSRX/p1.png",
        }));
        backend.insert_product(json!({
            "id": "P2",
            "name": "Sheet Mask",
            "brand": "",
            "category": "mask",
            "price": 120,
            "image": "",
        }));
        backend
    }

    pub fn insert_order(&self, order: Value) {
        if let Value::Object(map) = order {
            self.state.lock().orders.push(map);
        }
    }

    pub fn insert_product(&self, product: Value) {
        if let Value::Object(map) = product {
            self.state.lock().products.push(map);
        }
    }

    pub fn remove_product(&self, id: &str) {
        self.state.lock().products.retain(|p| p.get("id") != Some(&json!(id)));
    }

    pub fn fail_next(&self, sub_action: &str, failure: Failure) {
        self.state
            .lock()
            .failures
            .entry(sub_action.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Every upload of `file_name` fails until the backend is dropped.
    pub fn fail_uploads_of(&self, file_name: &str) {
        self.state.lock().failing_uploads.insert(file_name.to_string());
    }

    /// Holds the next call to `sub_action` until the returned gate is released.
    pub fn hold(&self, sub_action: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate {
            sub_action: sub_action.to_string(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<RpcRequest> {
        self.state.lock().calls.clone()
    }

    pub fn calls_to(&self, sub_action: &str) -> Vec<RpcRequest> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.sub_action == sub_action)
            .cloned()
            .collect()
    }

    pub fn order(&self, id: &str) -> Option<Value> {
        find(&self.state.lock().orders, "orderId", id).map(|m| Value::Object(m.clone()))
    }

    pub fn product(&self, id: &str) -> Option<Value> {
        find(&self.state.lock().products, "id", id).map(|m| Value::Object(m.clone()))
    }

    pub fn product_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .products
            .iter()
            .filter_map(|p| p.get("id").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    fn handle(&self, request: &RpcRequest) -> RpcResponse {
        let mut state = self.state.lock();
        match request.sub_action.as_str() {
            "getDashboardData" => RpcResponse::ok(json!({
                "orders": state.orders,
                "stats": { "totalOrders": state.orders.len() },
            })),
            "getProductsAdmin" => RpcResponse::ok(json!({ "products": state.products })),
            "updateOrdersBatch" => state.update_orders(request),
            "updateProductsBatch" => state.update_products(request),
            "deleteOrder" => state.delete("orderId", request),
            "deleteProduct" => state.delete("id", request),
            "reorderProducts" => state.reorder(request),
            "uploadImageToGitHub" => state.upload(request),
            "createManualOrder" => state.create_order(request),
            other => RpcResponse::failure(format!("unknown subAction {other}")),
        }
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RemoteError> {
        let gate = self
            .gate
            .lock()
            .take_if(|g| g.sub_action == request.sub_action);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let failure = {
            let mut state = self.state.lock();
            state.calls.push(request.clone());
            state
                .failures
                .get_mut(&request.sub_action)
                .and_then(VecDeque::pop_front)
        };
        match failure {
            Some(Failure::Network) => Err(RemoteError::Network("connection reset by peer".into())),
            Some(Failure::Rejected(message)) => Ok(RpcResponse::failure(message)),
            None => Ok(self.handle(&request)),
        }
    }
}

fn find<'a>(items: &'a [Map<String, Value>], id_field: &str, id: &str) -> Option<&'a Map<String, Value>> {
    items.iter().find(|m| m.get(id_field).and_then(Value::as_str) == Some(id))
}

fn updates(request: &RpcRequest) -> Vec<Map<String, Value>> {
    request
        .get("updates")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect()
        })
        .unwrap_or_default()
}

impl BackendState {
    /// All-or-nothing: an unknown order id rejects the whole batch.
    fn update_orders(&mut self, request: &RpcRequest) -> RpcResponse {
        let updates = updates(request);
        for update in &updates {
            let id = update.get("orderId").and_then(Value::as_str).unwrap_or_default();
            if find(&self.orders, "orderId", id).is_none() {
                return RpcResponse::failure(format!("找不到訂單 {id}"));
            }
        }
        for update in updates {
            let id = update.get("orderId").cloned();
            if let Some(order) = self.orders.iter_mut().find(|o| o.get("orderId") == id.as_ref()) {
                order.extend(update);
            }
        }
        RpcResponse::ok_empty()
    }

    /// Replaces products wholesale; a `null` id creates one.
    fn update_products(&mut self, request: &RpcRequest) -> RpcResponse {
        let updates = updates(request);
        for update in &updates {
            if let Some(id) = update.get("id").and_then(Value::as_str) {
                if find(&self.products, "id", id).is_none() {
                    return RpcResponse::failure(format!("找不到商品 {id}"));
                }
            }
        }
        for mut update in updates {
            match update.get("id").and_then(Value::as_str).map(str::to_string) {
                Some(id) => {
                    if let Some(product) = self
                        .products
                        .iter_mut()
                        .find(|p| p.get("id").and_then(Value::as_str) == Some(id.as_str()))
                    {
                        *product = update;
                    }
                }
                None => {
                    self.next_product += 1;
                    update.insert("id".into(), json!(format!("NP{}", self.next_product)));
                    self.products.push(update);
                }
            }
        }
        RpcResponse::ok_empty()
    }

    fn delete(&mut self, id_field: &str, request: &RpcRequest) -> RpcResponse {
        let Some(id) = request.get(id_field).and_then(Value::as_str) else {
            return RpcResponse::failure(format!("missing {id_field}"));
        };
        let items = if id_field == "orderId" {
            &mut self.orders
        } else {
            &mut self.products
        };
        let before = items.len();
        items.retain(|m| m.get(id_field).and_then(Value::as_str) != Some(id));
        if items.len() == before {
            return RpcResponse::failure(format!("{id} not found"));
        }
        RpcResponse::ok_empty()
    }

    /// Listed ids first in the given order; anything unlisted keeps its place after.
    fn reorder(&mut self, request: &RpcRequest) -> RpcResponse {
        let ordered: Vec<&str> = request
            .get("orderedIds")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let rank = |p: &Map<String, Value>| {
            p.get("id")
                .and_then(Value::as_str)
                .and_then(|id| ordered.iter().position(|o| *o == id))
                .unwrap_or(usize::MAX)
        };
        self.products.sort_by_key(|p| rank(p));
        RpcResponse::ok_empty()
    }

    fn upload(&mut self, request: &RpcRequest) -> RpcResponse {
        let file_name = request.get("fileName").and_then(Value::as_str).unwrap_or_default();
        let group = request.get("group").and_then(Value::as_str).unwrap_or("default");
        let content = request.get("content").and_then(Value::as_str).unwrap_or_default();
        if self.failing_uploads.contains(file_name) {
            return RpcResponse::failure(format!("upload of {file_name} failed"));
        }
        let digest = blake3::hash(content.as_bytes()).to_hex();
        RpcResponse::ok(json!({
            "url": format!("https://cdn.example/{group}/{}-{file_name}", &digest[..8]),
        }))
    }

    fn create_order(&mut self, request: &RpcRequest) -> RpcResponse {
        let Some(data) = request.get("orderData").and_then(Value::as_object) else {
            return RpcResponse::failure("missing orderData");
        };
        self.next_order += 1;
        let order_id = format!("MAN-{}", self.next_order);
        let customer = data.get("customer").cloned().unwrap_or(Value::Null);
        self.orders.push(
            json!({
                "orderId": order_id,
                "status": "待處理",
                "customerName": customer.get("name").cloned().unwrap_or(Value::Null),
                "customerPhone": customer.get("phone").cloned().unwrap_or(Value::Null),
                "total": data.get("total").cloned().unwrap_or(Value::Null),
                "items": data.get("items").cloned().unwrap_or(Value::Null),
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );
        RpcResponse::ok(json!({ "orderId": order_id }))
    }
}
