//! 内置零售商的页面选择器表
//!
//! 选择器可以是逗号分隔的多个候选（`querySelector` 语义）

use super::registry::RetailerKind;

/// 结账表单字段的选择器
#[derive(Debug, Clone, Copy)]
pub struct CheckoutForm {
    pub email: Option<&'static str>,
    pub name: Option<&'static str>,
    pub address: Option<&'static str>,
    pub city: Option<&'static str>,
    pub state: Option<&'static str>,
    pub zip: Option<&'static str>,
    pub phone: Option<&'static str>,
    pub card_number: Option<&'static str>,
    pub card_expiry: Option<&'static str>,
    pub card_cvv: Option<&'static str>,
}

/// 单个零售商的选择器表
#[derive(Debug, Clone, Copy)]
pub struct SelectorProfile {
    pub name: &'static str,
    /// 只有商品 ID 时使用，`{id}` 会被替换
    pub product_url_template: Option<&'static str>,
    pub cart_url: Option<&'static str>,
    pub captcha: Option<&'static str>,
    pub add_to_cart: &'static str,
    pub sold_out: Option<&'static str>,
    pub size_options: Option<&'static str>,
    pub color_options: Option<&'static str>,
    pub price: Option<&'static str>,
    pub proceed_to_checkout: &'static str,
    pub guest_checkout: Option<&'static str>,
    pub login_email: Option<&'static str>,
    pub login_password: Option<&'static str>,
    pub login_submit: Option<&'static str>,
    pub form: CheckoutForm,
    pub place_order: &'static str,
    pub order_confirmation: &'static str,
    pub order_total: Option<&'static str>,
}

impl SelectorProfile {
    pub fn supports_login(&self) -> bool {
        self.login_email.is_some() && self.login_password.is_some() && self.login_submit.is_some()
    }

    pub fn for_kind(kind: RetailerKind) -> &'static SelectorProfile {
        match kind {
            RetailerKind::Amazon => &AMAZON,
            RetailerKind::Walmart => &WALMART,
            RetailerKind::Target => &TARGET,
            RetailerKind::BestBuy => &BEST_BUY,
            RetailerKind::Nike => &NIKE,
            RetailerKind::Shopify | RetailerKind::Generic => &SHOPIFY,
        }
    }
}

const NO_FORM: CheckoutForm = CheckoutForm {
    email: None,
    name: None,
    address: None,
    city: None,
    state: None,
    zip: None,
    phone: None,
    card_number: None,
    card_expiry: None,
    card_cvv: None,
};

pub static AMAZON: SelectorProfile = SelectorProfile {
    name: "amazon",
    product_url_template: Some("https://www.amazon.com/dp/{id}"),
    cart_url: Some("https://www.amazon.com/gp/cart/view.html"),
    captcha: Some("#captchacharacters"),
    add_to_cart: "#add-to-cart-button",
    sold_out: Some("#outOfStock"),
    size_options: Some("#native_dropdown_selected_size_name"),
    color_options: Some("#variation_color_name .a-declarative"),
    price: Some("#corePrice_feature_div .a-offscreen, #priceblock_ourprice"),
    proceed_to_checkout: "#sc-buy-box-ptc-button",
    guest_checkout: None,
    login_email: Some("#ap_email"),
    login_password: Some("#ap_password"),
    login_submit: Some("#signInSubmit"),
    // 亚马逊使用账号内保存的地址与支付方式
    form: NO_FORM,
    place_order: "#submitOrderButtonId",
    order_confirmation: ".order-thank-you-message",
    order_total: Some(".grand-total-price"),
};

pub static WALMART: SelectorProfile = SelectorProfile {
    name: "walmart",
    product_url_template: Some("https://www.walmart.com/ip/{id}"),
    cart_url: Some("https://www.walmart.com/cart"),
    captcha: Some(r#"[data-automation-id="captcha-container"]"#),
    add_to_cart: r#"[data-automation-id="add-to-cart-button"]"#,
    sold_out: Some(r#"[data-automation-id="out-of-stock-message"]"#),
    size_options: Some(r#"[data-automation-id="variant-attribute-selector-group-size"] button"#),
    color_options: Some(r#"[data-automation-id="variant-attribute-selector-group-color"] button"#),
    price: Some(r#"[itemprop="price"]"#),
    proceed_to_checkout: r#"[data-automation-id="proceed-to-checkout-button"]"#,
    guest_checkout: Some(r#"[data-automation-id="guest-checkout-button"]"#),
    login_email: None,
    login_password: None,
    login_submit: None,
    form: CheckoutForm {
        email: Some(r#"[data-automation-id="email-input"]"#),
        name: Some(r#"[data-automation-id="first-name-input"]"#),
        address: Some(r#"[data-automation-id="address-line-1-input"]"#),
        city: Some(r#"[data-automation-id="city-input"]"#),
        state: Some(r#"[data-automation-id="state-select"]"#),
        zip: Some(r#"[data-automation-id="zip-code-input"]"#),
        phone: Some(r#"[data-automation-id="phone-input"]"#),
        card_number: Some(r#"[data-automation-id="cc-number-input"]"#),
        card_expiry: Some(r#"[data-automation-id="cc-expiry-input"]"#),
        card_cvv: Some(r#"[data-automation-id="cc-cvv-input"]"#),
    },
    place_order: r#"[data-automation-id="place-order-button"]"#,
    order_confirmation: r#"[data-automation-id="order-confirmation-number"]"#,
    order_total: Some(r#"[data-automation-id="order-total"]"#),
};

pub static TARGET: SelectorProfile = SelectorProfile {
    name: "target",
    product_url_template: Some("https://www.target.com/p/-/A-{id}"),
    cart_url: Some("https://www.target.com/cart"),
    captcha: Some(r#"iframe[title="recaptcha challenge"]"#),
    add_to_cart: r#"button[data-test="shipItButton"], button[data-test="pickupButton"]"#,
    sold_out: Some(r#"div[data-test="oosMessage"]"#),
    size_options: Some(r#"div[data-test="sizeBlock"] button"#),
    color_options: Some(r#"div[data-test="colorBlock"] button"#),
    price: Some(r#"span[data-test="product-price"]"#),
    proceed_to_checkout: r#"button[data-test="checkout-button"]"#,
    guest_checkout: Some(r#"button[data-test="guestCheckoutBtn"]"#),
    login_email: Some(r#"input[id="username"]"#),
    login_password: Some(r#"input[id="password"]"#),
    login_submit: Some(r#"button[id="login"]"#),
    form: CheckoutForm {
        email: Some(r#"input[id="email"]"#),
        name: Some(r#"input[id="full_name"]"#),
        address: Some(r#"input[id="address_line1"]"#),
        city: Some(r#"input[id="city"]"#),
        state: Some(r#"select[id="state"]"#),
        zip: Some(r#"input[id="zip_code"]"#),
        phone: Some(r#"input[id="mobile"]"#),
        card_number: Some(r#"input[id="creditCardInput-cardNumber"]"#),
        card_expiry: Some(r#"input[id="creditCardInput-expiration"]"#),
        card_cvv: Some(r#"input[id="creditCardInput-securityCode"]"#),
    },
    place_order: r#"button[data-test="placeOrderButton"]"#,
    order_confirmation: r#"span[data-test="confirmationNumber"]"#,
    order_total: Some(r#"[data-test="cart-summary-total"]"#),
};

pub static BEST_BUY: SelectorProfile = SelectorProfile {
    name: "bestbuy",
    product_url_template: Some("https://www.bestbuy.com/site/-/{id}.p"),
    cart_url: Some("https://www.bestbuy.com/cart"),
    captcha: Some(r#"iframe[src*="recaptcha"]"#),
    add_to_cart: ".add-to-cart-button:not(.btn-disabled), .fulfillment-add-to-cart-button",
    sold_out: Some(".add-to-cart-button.btn-disabled"),
    size_options: Some(".variation-option-selector"),
    color_options: Some(".color-swatches-list button"),
    price: Some(".priceView-customer-price span"),
    proceed_to_checkout: ".checkout-buttons__checkout",
    guest_checkout: Some(".checkout-guest"),
    login_email: Some("#fld-e"),
    login_password: Some("#fld-p1"),
    login_submit: Some(".cia-form__controls__submit"),
    form: CheckoutForm {
        email: Some("#user\\.emailAddress"),
        name: Some("#firstName"),
        address: Some("#street"),
        city: Some("#city"),
        state: Some("#state"),
        zip: Some("#zipcode"),
        phone: Some("#user\\.phone"),
        card_number: Some("#optimized-cc-card-number"),
        card_expiry: Some("#expiration-month"),
        card_cvv: Some("#credit-card-cvv"),
    },
    place_order: ".button__fast-track",
    order_confirmation: ".order-number",
    order_total: Some(".order-summary__total .order-summary__price"),
};

pub static NIKE: SelectorProfile = SelectorProfile {
    name: "nike",
    product_url_template: Some("https://www.nike.com/t/{id}"),
    cart_url: Some("https://www.nike.com/cart"),
    captcha: Some(r#"iframe[src*="captcha"]"#),
    add_to_cart: r#"button[data-qa="add-to-cart"], .add-to-cart-btn:not(:disabled)"#,
    sold_out: Some(".out-of-stock, button.add-to-cart-btn:disabled"),
    size_options: Some(r#"[data-qa="size-dropdown"] button, button[data-test="size-dropdown-option"]"#),
    color_options: None,
    price: Some(".product-price"),
    proceed_to_checkout: r#".fulfillment-btn, button[data-automation="member-checkout-button"]"#,
    guest_checkout: Some(r#".guest-checkout, button[data-automation="guest-checkout-button"]"#),
    login_email: Some(r#"input[type="email"], input[data-componentname="emailAddress"]"#),
    login_password: Some(r#"input[type="password"], input[data-componentname="password"]"#),
    login_submit: Some(r#".nike-unite-submit-button button, button[data-automation="continue-button"]"#),
    form: CheckoutForm {
        email: Some(r#"#email, input[name="email"]"#),
        name: Some(r#"#firstName, input[name="firstName"]"#),
        address: Some(r#"#address1, input[name="address1"]"#),
        city: Some(r#"#city, input[name="city"]"#),
        state: Some(r#"#state, select[name="state"]"#),
        zip: Some(r#"#postalCode, input[name="postalCode"]"#),
        phone: Some(r#"#phoneNumber, input[name="phoneNumber"]"#),
        card_number: Some(r#"#creditCardNumber, input[name="creditCardNumber"]"#),
        card_expiry: Some(r#"#expirationDate, input[name="expirationDate"]"#),
        card_cvv: Some(r#"#cvNumber, input[name="cvNumber"]"#),
    },
    place_order: r#"button[data-automation="place-order-button"], .place-order-btn"#,
    order_confirmation: r#".order-confirmation-number, [data-automation="order-number"]"#,
    order_total: Some(r#"[data-automation="order-total"]"#),
};

/// Shopify 店铺的通用选择器，也作为未知零售商的默认表
pub static SHOPIFY: SelectorProfile = SelectorProfile {
    name: "shopify",
    product_url_template: None,
    cart_url: None,
    captcha: Some(r#"iframe[src*="recaptcha"], #challenge-form"#),
    add_to_cart: r#"button[name="add"]:not([disabled]), .add-to-cart, #AddToCart"#,
    sold_out: Some(r#".sold-out, button[name="add"][disabled]"#),
    size_options: Some(r#"select[name="options[Size]"], .single-option-selector__radio[name="Size"]"#),
    color_options: Some(r#".swatch-element, .color-option, select[name="options[Color]"]"#),
    price: Some(".product__price, .product-single__price, .price--sale"),
    proceed_to_checkout: r#".cart__checkout, .checkout-button, button[name="checkout"]"#,
    guest_checkout: None,
    login_email: None,
    login_password: None,
    login_submit: None,
    form: CheckoutForm {
        email: Some("#checkout_email, #email"),
        name: Some("#checkout_shipping_address_first_name"),
        address: Some("#checkout_shipping_address_address1"),
        city: Some("#checkout_shipping_address_city"),
        state: Some("#checkout_shipping_address_province"),
        zip: Some("#checkout_shipping_address_zip"),
        phone: Some("#checkout_shipping_address_phone"),
        card_number: Some(r#"#number, [data-card-field="number"] input"#),
        card_expiry: Some(r#"#expiry, [data-card-field="expiry"] input"#),
        card_cvv: Some(r#"#verification_value, [data-card-field="verification_value"] input"#),
    },
    place_order: r#"#continue_button, .step__footer__continue-btn"#,
    order_confirmation: ".os-order-number",
    order_total: Some(".payment-due__price"),
};
