#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Value, json};

use storefront_bff::{
    config::{AppConfig, CoreConfig, IdempotencyConfig, PaymentConfig},
    dto::checkout::PaymentInstructions,
    idempotency::MemoryIdempotencyStore,
    middleware::auth::AuthUser,
    models::PaymentMethod,
    state::AppState,
    upstream::{CoreApi, CoreError, CoreLine, CorePlaceRequest, CorePreviewRequest, CoreResult},
};

pub const JWT_SECRET: &str = "test-secret";
pub const SHIPPING_FEE: i64 = 30;

#[derive(Debug, Clone)]
pub struct Variant {
    pub price: i64,
    pub stock: i64,
    pub active: bool,
}

#[derive(Debug, Clone)]
struct CartLine {
    id: i64,
    variant_id: i64,
    qty: i64,
    snapshot: i64,
}

#[derive(Debug, Clone)]
struct OrderRecord {
    id: i64,
    user_id: i64,
    method: PaymentMethod,
    payment_status: &'static str,
    grand_total: i64,
}

#[derive(Default)]
struct FakeState {
    variants: HashMap<i64, Variant>,
    carts: HashMap<i64, Vec<CartLine>>,
    next_item_id: i64,
    next_order_id: i64,
    placed: HashMap<(i64, String), Value>,
    orders: Vec<OrderRecord>,
    payment_options: Option<Vec<&'static str>>,
}

fn rejected(status: u16, code: &str, message: &str) -> CoreError {
    CoreError::Rejected {
        status,
        code: Some(code.to_string()),
        message: Some(message.to_string()),
    }
}

/// In-memory Core. Each endpoint answers in a different dialect so every response goes
/// through normalization for real.
#[derive(Default)]
pub struct FakeCore {
    state: Mutex<FakeState>,
    place_delay: Mutex<Duration>,
    /// Commit the next placement but answer with a timeout.
    pub timeout_next_place: AtomicBool,
    pub place_calls: AtomicUsize,
    pub commits: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub preview_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
}

impl FakeCore {
    pub fn new() -> Arc<Self> {
        let core = Self::default();
        {
            let mut state = core.lock();
            state.next_item_id = 1;
            state.next_order_id = 1000;
        }
        Arc::new(core)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_variant(self: Arc<Self>, id: i64, price: i64, stock: i64) -> Arc<Self> {
        self.lock().variants.insert(
            id,
            Variant {
                price,
                stock,
                active: true,
            },
        );
        self
    }

    pub fn set_price(&self, id: i64, price: i64) {
        if let Some(variant) = self.lock().variants.get_mut(&id) {
            variant.price = price;
        }
    }

    pub fn deactivate(&self, id: i64) {
        if let Some(variant) = self.lock().variants.get_mut(&id) {
            variant.active = false;
        }
    }

    pub fn stock(&self, id: i64) -> i64 {
        self.lock().variants.get(&id).map_or(0, |v| v.stock)
    }

    pub fn set_stock(&self, id: i64, stock: i64) {
        if let Some(variant) = self.lock().variants.get_mut(&id) {
            variant.stock = stock;
        }
    }

    pub fn offer_only(&self, codes: Vec<&'static str>) {
        self.lock().payment_options = Some(codes);
    }

    pub fn set_place_delay(&self, delay: Duration) {
        *self.place_delay.lock().unwrap() = delay;
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn first_cart_item_id(&self, user_id: i64) -> Option<i64> {
        self.lock()
            .carts
            .get(&user_id)
            .and_then(|lines| lines.first().map(|line| line.id))
    }

    fn snake_line(state: &FakeState, line: &CartLine) -> Value {
        let current = state.variants.get(&line.variant_id).map(|v| v.price);
        json!({
            "id": line.id,
            "variant_id": line.variant_id,
            "quantity": line.qty,
            "price_snapshot": line.snapshot,
            "variant": {
                "price": current,
                "name": "30ml",
                "product": { "name": format!("Product {}", line.variant_id), "image": format!("img/{}.png", line.variant_id) }
            }
        })
    }

    fn snake_cart(state: &FakeState, user_id: i64) -> Value {
        match state.carts.get(&user_id) {
            None => json!({ "success": true, "data": null }),
            Some(lines) => json!({
                "success": true,
                "data": {
                    "cart": {
                        "cart_id": user_id * 10,
                        "user_id": user_id,
                        "cart_items": lines.iter().map(|l| Self::snake_line(state, l)).collect::<Vec<_>>()
                    }
                }
            }),
        }
    }

    fn camel_cart(state: &FakeState, user_id: i64) -> Value {
        let lines = state.carts.get(&user_id).cloned().unwrap_or_default();
        json!({
            "cartId": user_id * 10,
            "itemCount": 999,
            "items": lines.iter().map(|l| json!({
                "cartItemId": l.id,
                "variantId": l.variant_id,
                "qty": l.qty,
                "unitPriceSnapshot": l.snapshot,
                "currentPrice": state.variants.get(&l.variant_id).map(|v| v.price),
                "productName": format!("Product {}", l.variant_id),
                "variantName": "30ml",
                "imageUrl": format!("/img/{}.png", l.variant_id)
            })).collect::<Vec<_>>()
        })
    }

    fn nested_cart(state: &FakeState, user_id: i64) -> Value {
        let lines = state.carts.get(&user_id).cloned().unwrap_or_default();
        json!({
            "data": {
                "id": user_id * 10,
                "lines": lines.iter().map(|l| json!({
                    "item_id": l.id,
                    "variant": { "id": l.variant_id, "price": state.variants.get(&l.variant_id).map(|v| v.price), "capacity": "30ml" },
                    "product": { "name": format!("Product {}", l.variant_id), "imageUrl": format!("https://cdn.test/img/{}.png", l.variant_id) },
                    "qty": l.qty,
                    "unit_price": l.snapshot
                })).collect::<Vec<_>>()
            }
        })
    }

    fn order_json(order: &OrderRecord) -> Value {
        json!({
            "id": order.id,
            "order_code": format!("ORD-{}", order.id),
            "status": "placed",
            "payment_method": order.method.code(),
            "payment_status": order.payment_status,
            "grand_total": order.grand_total,
            "created_at": "2026-10-16T08:00:00Z"
        })
    }
}

#[async_trait]
impl CoreApi for FakeCore {
    async fn get_cart(&self, user_id: i64) -> CoreResult<Value> {
        let state = self.lock();
        Ok(Self::snake_cart(&state, user_id))
    }

    async fn add_cart_item(&self, user_id: i64, line: CoreLine) -> CoreResult<Value> {
        let mut state = self.lock();
        let price = state
            .variants
            .get(&line.variant_id)
            .map(|v| v.price)
            .ok_or_else(|| rejected(404, "VARIANT_NOT_FOUND", "Variant not found"))?;
        let next_id = state.next_item_id;
        let lines = state.carts.entry(user_id).or_default();
        let created = match lines.iter().position(|l| l.variant_id == line.variant_id) {
            Some(index) => {
                lines[index].qty += line.qty;
                false
            }
            None => {
                lines.push(CartLine {
                    id: next_id,
                    variant_id: line.variant_id,
                    qty: line.qty,
                    snapshot: price,
                });
                true
            }
        };
        if created {
            state.next_item_id += 1;
        }
        Ok(Self::camel_cart(&state, user_id))
    }

    async fn set_cart_item_qty(&self, user_id: i64, line: CoreLine) -> CoreResult<Value> {
        let mut state = self.lock();
        let price = state.variants.get(&line.variant_id).map(|v| v.price);
        let next_id = state.next_item_id;
        let lines = state.carts.entry(user_id).or_default();
        let position = lines.iter().position(|l| l.variant_id == line.variant_id);
        match (position, line.qty) {
            (None, 0) => return Err(rejected(404, "CART_ITEM_NOT_FOUND", "No such line")),
            (Some(index), 0) => {
                lines.remove(index);
            }
            (Some(index), qty) => lines[index].qty = qty,
            (None, qty) => {
                let snapshot =
                    price.ok_or_else(|| rejected(404, "VARIANT_NOT_FOUND", "Variant not found"))?;
                lines.push(CartLine {
                    id: next_id,
                    variant_id: line.variant_id,
                    qty,
                    snapshot,
                });
                state.next_item_id += 1;
            }
        }
        // Bare acknowledgement; the caller has to re-fetch.
        Ok(json!({ "success": true, "message": "updated" }))
    }

    async fn remove_cart_item(&self, user_id: i64, cart_item_id: i64) -> CoreResult<Value> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        let lines = state.carts.entry(user_id).or_default();
        let before = lines.len();
        lines.retain(|l| l.id != cart_item_id);
        if lines.len() == before {
            return Err(rejected(404, "CART_ITEM_NOT_FOUND", "No such line"));
        }
        Ok(Self::nested_cart(&state, user_id))
    }

    async fn preview_checkout(
        &self,
        _user_id: i64,
        request: &CorePreviewRequest,
    ) -> CoreResult<Value> {
        self.preview_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        let lines: Vec<Value> = request
            .items
            .iter()
            .filter_map(|item| {
                state.variants.get(&item.variant_id).map(|v| {
                    json!({
                        "variantId": item.variant_id,
                        "currentPrice": v.price,
                        "stock": v.stock,
                        "isActive": v.active,
                        "productName": format!("Product {}", item.variant_id)
                    })
                })
            })
            .collect();
        let mut body = json!({
            "lines": lines,
            "shippingFee": SHIPPING_FEE,
            "discountTotal": 0
        });
        if let Some(options) = &state.payment_options {
            body["paymentOptions"] = json!(options
                .iter()
                .map(|code| json!({ "code": code, "enabled": true }))
                .collect::<Vec<_>>());
        }
        Ok(json!({ "success": true, "data": body }))
    }

    async fn place_order(
        &self,
        user_id: i64,
        idempotency_key: &str,
        request: &CorePlaceRequest,
    ) -> CoreResult<Value> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.place_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        let dedupe = (user_id, idempotency_key.to_string());
        if let Some(previous) = state.placed.get(&dedupe) {
            return Ok(previous.clone());
        }

        let mut subtotal = 0;
        for item in &request.items {
            let variant = state
                .variants
                .get(&item.variant_id)
                .filter(|v| v.active)
                .ok_or_else(|| rejected(409, "VARIANT_UNAVAILABLE", "Variant unavailable"))?;
            if variant.stock < item.qty {
                return Err(rejected(409, "INSUFFICIENT_STOCK", "Not enough stock"));
            }
            subtotal += variant.price * item.qty;
        }
        let grand_total = subtotal + SHIPPING_FEE;
        if grand_total != request.expected_grand_total {
            return Err(rejected(409, "PRICE_CHANGED", "Prices changed"));
        }

        for item in &request.items {
            if let Some(variant) = state.variants.get_mut(&item.variant_id) {
                variant.stock -= item.qty;
            }
        }
        let order_id = state.next_order_id;
        state.next_order_id += 1;
        state.orders.push(OrderRecord {
            id: order_id,
            user_id,
            method: request.payment_method_code,
            payment_status: match request.payment_method_code {
                PaymentMethod::Cod => "unpaid",
                _ => "pending",
            },
            grand_total,
        });
        self.commits.fetch_add(1, Ordering::SeqCst);

        let response = match request.payment_method_code {
            PaymentMethod::Cod => json!({ "data": { "orderId": order_id, "message": "Thanks for your order" } }),
            PaymentMethod::BankTransfer => json!({
                "order_id": order_id,
                "bank_transfer": { "qr_url": "/qr/bank.png", "note": format!("ACB 0123 ORD-{order_id}") }
            }),
            PaymentMethod::Vnpay => json!({
                "data": {
                    "order": { "id": order_id },
                    "paymentUrl": format!("https://sandbox.vnpayment.vn/pay?ref={order_id}")
                }
            }),
        };
        state.placed.insert(dedupe, response.clone());
        if self.timeout_next_place.swap(false, Ordering::SeqCst) {
            return Err(CoreError::Timeout);
        }
        Ok(response)
    }

    async fn verify_payment(&self, params: &BTreeMap<String, String>) -> CoreResult<Value> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let order_id: i64 = params
            .get("vnp_TxnRef")
            .and_then(|r| r.parse().ok())
            .ok_or_else(|| rejected(400, "BAD_TXN_REF", "Unknown transaction"))?;
        let code = params.get("vnp_ResponseCode").cloned().unwrap_or_default();

        let mut state = self.lock();
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| rejected(404, "ORDER_NOT_FOUND", "Order not found"))?;
        if code == "00" {
            order.payment_status = "paid";
            Ok(json!({ "success": true, "data": { "orderId": order_id, "paymentStatus": "paid" } }))
        } else {
            Ok(json!({
                "RspCode": "00",
                "orderId": order_id,
                "vnp_ResponseCode": code,
                "message": "Transaction failed"
            }))
        }
    }

    async fn list_orders(&self, user_id: i64, page: i64, limit: i64) -> CoreResult<Value> {
        let state = self.lock();
        let offset = usize::try_from((page - 1).saturating_mul(limit)).unwrap_or(usize::MAX);
        let orders: Vec<Value> = state
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .skip(offset)
            .take(limit as usize)
            .map(Self::order_json)
            .collect();
        Ok(json!({ "data": { "orders": orders } }))
    }

    async fn count_orders(&self, user_id: i64) -> CoreResult<Value> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        let count = state.orders.iter().filter(|o| o.user_id == user_id).count();
        Ok(json!({ "data": { "count": count } }))
    }

    async fn get_order(&self, user_id: i64, order_id: i64) -> CoreResult<Value> {
        let state = self.lock();
        state
            .orders
            .iter()
            .find(|o| o.id == order_id && o.user_id == user_id)
            .map(|o| json!({ "data": Self::order_json(o) }))
            .ok_or_else(|| rejected(404, "ORDER_NOT_FOUND", "Order not found"))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: None,
        jwt_secret: SecretString::from(JWT_SECRET),
        asset_base_url: "https://cdn.test".into(),
        core: CoreConfig {
            base_url: "http://core.invalid".into(),
            internal_key: SecretString::from("internal-key"),
            timeout: Duration::from_secs(2),
        },
        idempotency: IdempotencyConfig {
            ttl: Duration::from_secs(3600),
            in_flight_wait: Duration::from_secs(5),
        },
        payment: PaymentConfig {
            enabled_methods: PaymentMethod::ALL.to_vec(),
            bank_transfer: PaymentInstructions {
                image_url: "/qr/default.png".into(),
                note: "Default note".into(),
                phone: "0900000000".into(),
                note_hint: "Write your order code".into(),
            },
        },
    }
}

pub fn state_with(core: Arc<FakeCore>) -> AppState {
    state_with_config(core, test_config())
}

pub fn state_with_config(core: Arc<FakeCore>, config: AppConfig) -> AppState {
    AppState::new(config, core, Arc::new(MemoryIdempotencyStore::new()), None)
}

pub fn user(user_id: i64) -> AuthUser {
    AuthUser { user_id }
}
