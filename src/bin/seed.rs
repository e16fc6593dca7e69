use argon2::{
    Argon2, PasswordHasher,
    password_hash::SaltString,
};
use chrono::{Duration, Utc};
use password_hash::rand_core::OsRng;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use marketplace_order_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        coupons::ActiveModel as CouponActive, products::ActiveModel as ProductActive,
        users::ActiveModel as UserActive,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let password_hash = hash_password("password123")?;

    let admin = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set("admin@example.com".into()),
        password_hash: Set(password_hash.clone()),
        role: Set("admin".into()),
        created_at: NotSet,
    }
    .insert(&orm)
    .await?;

    let seller = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set("seller@example.com".into()),
        password_hash: Set(password_hash.clone()),
        role: Set("seller".into()),
        created_at: NotSet,
    }
    .insert(&orm)
    .await?;

    UserActive {
        id: Set(Uuid::new_v4()),
        email: Set("buyer@example.com".into()),
        password_hash: Set(password_hash),
        role: Set("user".into()),
        created_at: NotSet,
    }
    .insert(&orm)
    .await?;

    let products = [
        ("Mechanical Keyboard", 8900_i64, 25),
        ("USB-C Hub", 3500, 40),
        ("Laptop Stand", 4900, 15),
    ];
    for (title, price, stock) in products {
        ProductActive {
            id: Set(Uuid::new_v4()),
            seller_id: Set(seller.id),
            title: Set(title.into()),
            description: Set(Some(format!("{title} from the seed catalog"))),
            price: Set(price),
            stock: Set(stock),
            deleted_at: Set(None),
            created_at: NotSet,
        }
        .insert(&orm)
        .await?;
    }

    CouponActive {
        id: Set(Uuid::new_v4()),
        code: Set("SAVE20".into()),
        kind: Set("percentage".into()),
        value: Set(20),
        min_amount: Set(0),
        max_discount: Set(None),
        expires_at: Set(Some((Utc::now() + Duration::days(30)).into())),
        is_active: Set(true),
        usage_limit: Set(None),
        created_by: Set(admin.id),
        created_at: NotSet,
    }
    .insert(&orm)
    .await?;

    println!("Seed data inserted");
    Ok(())
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(hash.to_string())
}
