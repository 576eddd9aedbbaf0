use crate::{
    dto::{
        checkout::{
            CheckoutRequest, CheckoutSource, LineInput, PaymentSelection, PreviewDto, PreviewLine,
            PreviewWarning, ShippingSnapshot, Totals, WarningKind, merge_lines,
        },
        normalize::{CoreQuote, NormalizeError, QuotedLine, normalize_quote},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::PaymentMethod,
    response::ApiResponse,
    services::cart_service::{load_cart, validate_qty, validate_variant_id},
    state::AppState,
    upstream::CorePreviewRequest,
};

/// Rejects inputs that can be judged without Core.
pub(crate) fn validate_request(request: &CheckoutRequest) -> AppResult<()> {
    if let Some(address_id) = request.address_id
        && address_id <= 0
    {
        return Err(AppError::Validation(
            "addressId must be a positive integer".to_string(),
        ));
    }
    if let Some(snapshot) = &request.shipping_snapshot {
        snapshot.validate().map_err(AppError::Validation)?;
    }
    Ok(())
}

async fn resolve_lines(
    state: &AppState,
    user_id: i64,
    request: &CheckoutRequest,
) -> AppResult<Vec<LineInput>> {
    match request.source {
        CheckoutSource::Cart => {
            let cart = load_cart(state, user_id).await?;
            Ok(merge_lines(cart.items.iter().map(|item| LineInput {
                variant_id: item.variant_id,
                qty: item.qty,
            })))
        }
        CheckoutSource::BuyNow => {
            let items = request
                .items
                .as_deref()
                .filter(|items| !items.is_empty())
                .ok_or_else(|| {
                    AppError::Validation("items are required for buy_now checkout".to_string())
                })?;
            for item in items {
                validate_variant_id(item.variant_id)?;
                validate_qty(item.qty, false)?;
            }
            Ok(merge_lines(items.iter().cloned()))
        }
    }
}

fn requested_code(request: &CheckoutRequest) -> Option<String> {
    request
        .payment_method_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

/// Prices one requested line against Core's quote.
pub fn price_line(input: &LineInput, quoted: Option<&QuotedLine>) -> PreviewLine {
    let mut warnings = Vec::new();
    let Some(quoted) = quoted else {
        return PreviewLine {
            variant_id: input.variant_id,
            product_name: None,
            variant_name: None,
            image_url: None,
            qty_requested: input.qty,
            qty_priced: 0,
            unit_price: None,
            line_subtotal: 0,
            warnings: vec![WarningKind::PriceMissing],
        };
    };

    if !quoted.active {
        warnings.push(WarningKind::Inactive);
    }
    let qty_priced = match quoted.available {
        Some(available) if available <= 0 => {
            warnings.push(WarningKind::OutOfStock);
            0
        }
        Some(available) if available < input.qty => {
            warnings.push(WarningKind::LowStock);
            available
        }
        _ => input.qty,
    };
    // A price that cannot be multiplied out is as unusable as no price.
    let priced_total = quoted
        .unit_price
        .and_then(|price| price.checked_mul(qty_priced));
    if priced_total.is_none() {
        warnings.push(WarningKind::PriceMissing);
    }
    warnings.sort();

    let blocked = warnings.iter().any(WarningKind::is_blocking);
    let line_subtotal = match priced_total {
        Some(total) if !blocked => total,
        _ => 0,
    };

    PreviewLine {
        variant_id: input.variant_id,
        product_name: quoted.product_name.clone(),
        variant_name: quoted.variant_name.clone(),
        image_url: quoted.image_url.clone(),
        qty_requested: input.qty,
        qty_priced,
        unit_price: quoted.unit_price,
        line_subtotal,
        warnings,
    }
}

/// Picks the method to use: the requested one when offered, otherwise the first offered
/// method in canonical order.
pub fn resolve_payment(requested: Option<String>, offered: &[PaymentMethod]) -> PaymentSelection {
    let mut options: Vec<PaymentMethod> = PaymentMethod::ALL
        .into_iter()
        .filter(|method| offered.contains(method))
        .collect();
    if options.is_empty() {
        options = PaymentMethod::ALL.to_vec();
    }

    let wanted = requested
        .as_deref()
        .and_then(|code| code.parse::<PaymentMethod>().ok())
        .filter(|method| options.contains(method));
    let effective = wanted.unwrap_or(options[0]);

    PaymentSelection {
        requested,
        effective,
        options,
    }
}

fn empty_preview(
    address: Option<ShippingSnapshot>,
    requested: Option<String>,
    offered: &[PaymentMethod],
) -> PreviewDto {
    let kind = WarningKind::EmptyCart;
    PreviewDto {
        address_snapshot: address,
        lines: Vec::new(),
        totals: Totals::default(),
        warnings: vec![PreviewWarning {
            variant_id: None,
            kind,
            message: kind.describe().to_string(),
        }],
        has_any_warning: true,
        payment: resolve_payment(requested, offered),
    }
}

/// Combines the requested lines with Core's quote.
pub fn assemble_preview(
    lines: &[LineInput],
    quote: &CoreQuote,
    address: Option<ShippingSnapshot>,
    requested: Option<String>,
    configured: &[PaymentMethod],
) -> Result<PreviewDto, NormalizeError> {
    let priced: Vec<PreviewLine> = lines
        .iter()
        .map(|line| price_line(line, quote.line(line.variant_id)))
        .collect();

    let warnings: Vec<PreviewWarning> = priced
        .iter()
        .flat_map(|line| {
            line.warnings.iter().map(|kind| PreviewWarning {
                variant_id: Some(line.variant_id),
                kind: *kind,
                message: kind.describe().to_string(),
            })
        })
        .collect();

    let totals = priced
        .iter()
        .try_fold(0i64, |acc, line| acc.checked_add(line.line_subtotal))
        .and_then(|subtotal| Totals::new(subtotal, quote.shipping_fee, quote.discount_total))
        .ok_or(NormalizeError::OutOfRange("checkout totals"))?;
    let offered = quote.payment_options.as_deref().unwrap_or(configured);

    Ok(PreviewDto {
        address_snapshot: quote.address_snapshot.clone().or(address),
        lines: priced,
        totals,
        has_any_warning: !warnings.is_empty(),
        warnings,
        payment: resolve_payment(requested, offered),
    })
}

/// Quotes the request at current prices. Never mutates the cart or any order.
pub async fn build_preview(
    state: &AppState,
    user_id: i64,
    request: &CheckoutRequest,
) -> AppResult<PreviewDto> {
    validate_request(request)?;
    let lines = resolve_lines(state, user_id, request).await?;
    let requested = requested_code(request);
    let configured = &state.config.payment.enabled_methods;

    if lines.is_empty() {
        return Ok(empty_preview(
            request.shipping_snapshot.clone(),
            requested,
            configured,
        ));
    }

    let core_request = CorePreviewRequest {
        source: request.source,
        items: lines.clone(),
        address_id: request.address_id,
        shipping_snapshot: request.shipping_snapshot.clone(),
        payment_method_code: requested
            .as_deref()
            .and_then(|code| code.parse::<PaymentMethod>().ok()),
    };
    let raw = state.core.preview_checkout(user_id, &core_request).await?;
    let quote = normalize_quote(&raw, &state.config.asset_base_url);

    let preview = assemble_preview(
        &lines,
        &quote,
        request.shipping_snapshot.clone(),
        requested,
        configured,
    )?;
    tracing::debug!(
        user_id,
        lines = preview.lines.len(),
        grand_total = preview.totals.grand_total,
        has_any_warning = preview.has_any_warning,
        "checkout preview built"
    );
    Ok(preview)
}

pub async fn preview(
    state: &AppState,
    user: &AuthUser,
    request: CheckoutRequest,
) -> AppResult<ApiResponse<PreviewDto>> {
    let preview = build_preview(state, user.user_id, &request).await?;
    Ok(ApiResponse::success("Checkout preview", preview, None))
}
