use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{AddToCartRequest, CartDto, CartItemDto, SetQuantityRequest},
        checkout::{
            CheckoutRequest, CheckoutSource, LineInput, PaymentInstructions, PaymentSelection,
            PlaceResult, PreviewDto, PreviewLine, PreviewWarning, ShippingSnapshot, Totals,
            WarningKind,
        },
        orders::{OrderList, OrderSummary},
        payment::PaymentReturnData,
    },
    error::ErrorData,
    models::{PaymentMethod, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::{cart, checkout, health, orders, params, payment},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::get_cart,
        cart::add_item,
        cart::set_quantity,
        cart::remove_item,
        checkout::preview,
        checkout::place,
        payment::payment_return,
        orders::list_orders,
        orders::get_order
    ),
    components(
        schemas(
            AddToCartRequest,
            SetQuantityRequest,
            CartItemDto,
            CartDto,
            CheckoutSource,
            LineInput,
            ShippingSnapshot,
            CheckoutRequest,
            WarningKind,
            PreviewLine,
            PreviewWarning,
            Totals,
            PaymentSelection,
            PreviewDto,
            PaymentInstructions,
            PlaceResult,
            PaymentMethod,
            PaymentStatus,
            PaymentReturnData,
            OrderSummary,
            OrderList,
            params::Pagination,
            ErrorData,
            Meta,
            ApiResponse<CartDto>,
            ApiResponse<PreviewDto>,
            ApiResponse<PlaceResult>,
            ApiResponse<PaymentReturnData>,
            ApiResponse<OrderList>,
            ApiResponse<OrderSummary>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Cart mutations relayed to Core"),
        (name = "Checkout", description = "Preview and idempotent order placement"),
        (name = "Payment", description = "Payment gateway return handling"),
        (name = "Orders", description = "Order lookup"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
