use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Result;

use crate::core::config;
use crate::credits::referral::generate_referral_code;

/// Структура, представляющая пользователя в базе данных.
///
/// Все счётчики кредитов хранятся в UTC; границей суток считается
/// календарный день по UTC (тот же, что использует `date('now')` в SQLite).
#[derive(Debug, Clone)]
pub struct User {
    /// Telegram ID пользователя
    pub telegram_id: i64,
    /// Имя пользователя (username) в Telegram, если доступно
    pub username: Option<String>,
    /// Имя (first name) из профиля Telegram
    pub first_name: Option<String>,
    /// Дневной лимит действий (может расти за счёт рефералов)
    pub daily_allowance: i64,
    /// Сколько действий потрачено с последнего сброса
    pub used_today: i64,
    /// Дата/время последнего сброса счётчика (формат SQLite `datetime('now')`)
    pub last_reset_at: String,
    /// Уникальный реферальный код пользователя (8 символов)
    pub referral_code: String,
    /// Код, который этот пользователь активировал (устанавливается один раз)
    pub referred_by: Option<String>,
    /// Сколько пользователей активировали код этого пользователя
    pub referral_count: i64,
    /// Флаг premium-тарифа (обходит дневной лимит)
    pub is_premium: bool,
}

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and runs schema migrations.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // WAL plus a busy timeout keeps concurrent writers queueing instead of
    // failing with SQLITE_BUSY.
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))?;
        Ok(())
    });
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    // Ensure schema is up to date on first connection
    let conn = pool.get()?;
    if let Err(e) = migrate_schema(&conn) {
        log::warn!("Failed to migrate schema: {}", e);
        // Don't fail on migration errors, as they might be expected
    }

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is automatically returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Migrate database schema to ensure all required columns exist
/// This function safely adds missing columns to existing tables
fn migrate_schema(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            telegram_id INTEGER PRIMARY KEY,
            username TEXT,
            first_name TEXT,
            daily_allowance INTEGER NOT NULL DEFAULT 10,
            used_today INTEGER NOT NULL DEFAULT 0,
            last_reset_at DATETIME NOT NULL DEFAULT (datetime('now')),
            referral_code TEXT NOT NULL UNIQUE,
            referred_by TEXT DEFAULT NULL,
            referral_count INTEGER NOT NULL DEFAULT 0,
            is_premium INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Uniqueness of referral codes is enforced by the schema, not by callers
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_referral_code ON users (referral_code)",
        [],
    )?;

    // Check if columns added after the initial release exist
    let mut stmt = conn.prepare("PRAGMA table_info(users)")?;
    let rows = stmt.query_map([], |row| {
        row.get::<_, String>(1) // column name
    })?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }

    // Add is_premium if it doesn't exist
    if !columns.contains(&"is_premium".to_string()) {
        log::info!("Adding missing column: is_premium to users table");
        if let Err(e) = conn.execute(
            "ALTER TABLE users ADD COLUMN is_premium INTEGER NOT NULL DEFAULT 0",
            [],
        ) {
            log::warn!("Failed to add is_premium column: {}", e);
        }
    }

    // Add referral_count if it doesn't exist
    if !columns.contains(&"referral_count".to_string()) {
        log::info!("Adding missing column: referral_count to users table");
        if let Err(e) = conn.execute(
            "ALTER TABLE users ADD COLUMN referral_count INTEGER NOT NULL DEFAULT 0",
            [],
        ) {
            log::warn!("Failed to add referral_count column: {}", e);
        }
    }

    Ok(())
}

/// Проверяет, является ли ошибка нарушением уникальности telegram_id
/// (гонка при первом контакте — пользователь создан параллельным запросом).
pub fn is_duplicate_identity(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("users.telegram_id")
        }
        _ => false,
    }
}

fn is_referral_code_collision(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("users.referral_code")
        }
        _ => false,
    }
}

/// Создаёт нового пользователя с дефолтным лимитом и свежим реферальным кодом.
///
/// Код генерируется заново при коллизии (уникальность проверяет индекс БД).
/// Возвращает ошибку нарушения уникальности telegram_id, если пользователь
/// уже существует — вызывающий код должен перечитать запись
/// (см. `is_duplicate_identity`).
pub fn create_user(
    conn: &DbConnection,
    telegram_id: i64,
    username: Option<String>,
    first_name: Option<String>,
) -> Result<User> {
    let allowance = *config::credits::DEFAULT_DAILY_ALLOWANCE;

    let mut last_err = None;
    for _ in 0..config::credits::REFERRAL_CODE_MAX_RETRIES {
        let code = generate_referral_code();
        let result = conn.execute(
            "INSERT INTO users (telegram_id, username, first_name, daily_allowance, used_today, last_reset_at, referral_code)
             VALUES (?1, ?2, ?3, ?4, 0, datetime('now'), ?5)",
            &[
                &telegram_id as &dyn rusqlite::ToSql,
                &username as &dyn rusqlite::ToSql,
                &first_name as &dyn rusqlite::ToSql,
                &allowance as &dyn rusqlite::ToSql,
                &code as &dyn rusqlite::ToSql,
            ],
        );

        match result {
            Ok(_) => {
                return get_user(conn, telegram_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows);
            }
            Err(e) if is_referral_code_collision(&e) => {
                log::warn!("Referral code collision for {}, regenerating", code);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or(rusqlite::Error::QueryReturnedNoRows))
}

fn user_from_row(row: &rusqlite::Row<'_>) -> Result<User> {
    Ok(User {
        telegram_id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        daily_allowance: row.get(3)?,
        used_today: row.get(4)?,
        last_reset_at: row.get(5)?,
        referral_code: row.get(6)?,
        referred_by: row.get(7)?,
        referral_count: row.get(8)?,
        is_premium: row.get::<_, i64>(9)? != 0,
    })
}

const USER_COLUMNS: &str = "telegram_id, username, first_name, daily_allowance, used_today, \
                            last_reset_at, referral_code, referred_by, referral_count, is_premium";

/// Получает пользователя из базы данных по Telegram ID.
///
/// Возвращает `Ok(Some(User))` если пользователь найден, `Ok(None)` если не найден.
pub fn get_user(conn: &DbConnection, telegram_id: i64) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE telegram_id = ?",
        USER_COLUMNS
    ))?;
    let mut rows = stmt.query(&[&telegram_id as &dyn rusqlite::ToSql])?;

    if let Some(row) = rows.next()? {
        Ok(Some(user_from_row(row)?))
    } else {
        Ok(None)
    }
}

/// Получает пользователя по его реферальному коду.
pub fn get_user_by_referral_code(conn: &DbConnection, code: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE referral_code = ?",
        USER_COLUMNS
    ))?;
    let mut rows = stmt.query(&[&code as &dyn rusqlite::ToSql])?;

    if let Some(row) = rows.next()? {
        Ok(Some(user_from_row(row)?))
    } else {
        Ok(None)
    }
}

/// Атомарно списывает один кредит, если лимит ещё не исчерпан.
///
/// Один UPDATE делает сразу три вещи: сбрасывает счётчик при смене
/// календарного дня, проверяет остаток и инкрементирует `used_today`.
/// SQLite сериализует записи, поэтому гонка «прочитали одно и то же,
/// записали оба» здесь невозможна — даже из нескольких процессов.
///
/// Возвращает `Ok(true)` если кредит списан, `Ok(false)` если лимит исчерпан.
pub fn try_consume_credit(conn: &DbConnection, telegram_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET
            used_today = CASE WHEN date(last_reset_at) <> date('now') THEN 1 ELSE used_today + 1 END,
            last_reset_at = CASE WHEN date(last_reset_at) <> date('now') THEN datetime('now') ELSE last_reset_at END
         WHERE telegram_id = ?1
           AND daily_allowance > 0
           AND (date(last_reset_at) <> date('now') OR used_today < daily_allowance)",
        &[&telegram_id as &dyn rusqlite::ToSql],
    )?;

    Ok(changed == 1)
}

/// Возвращает один списанный кредит (компенсация после неудачной операции).
///
/// Счётчик не опускается ниже нуля: если день успел смениться и счётчик
/// уже сброшен, возврат превращается в no-op.
pub fn refund_credit(conn: &DbConnection, telegram_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET used_today = MAX(used_today - 1, 0) WHERE telegram_id = ?1",
        &[&telegram_id as &dyn rusqlite::ToSql],
    )?;
    Ok(())
}

/// Сбрасывает счётчик пользователя, если последний сброс был в другой
/// календарный день. Используется для персистенции нормализации, когда
/// списание не состоялось, но запись всё равно устарела.
///
/// Возвращает `Ok(true)` если запись была обновлена.
pub fn reset_daily_usage_if_stale(conn: &DbConnection, telegram_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET used_today = 0, last_reset_at = datetime('now')
         WHERE telegram_id = ?1 AND date(last_reset_at) <> date('now')",
        &[&telegram_id as &dyn rusqlite::ToSql],
    )?;
    Ok(changed == 1)
}

/// Считает пользователей с устаревшим дневным счётчиком, ничего не меняя.
pub fn count_stale_quotas(conn: &DbConnection) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE date(last_reset_at) <> date('now')",
        [],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Сбрасывает устаревшие дневные счётчики всех пользователей.
///
/// Возвращает количество обновлённых записей.
pub fn reset_all_stale_quotas(conn: &DbConnection) -> Result<usize> {
    let count = conn.execute(
        "UPDATE users SET used_today = 0, last_reset_at = datetime('now')
         WHERE date(last_reset_at) <> date('now')",
        [],
    )?;

    if count > 0 {
        log::info!("Reset stale daily quota for {} user(s)", count);
    }

    Ok(count)
}

/// Отмечает активацию чужого кода: записывает `referred_by` и начисляет
/// бонус к лимиту. Guard `referred_by IS NULL` делает операцию одноразовой
/// даже при гонке двух одновременных активаций.
///
/// Возвращает `Ok(true)` если код записан, `Ok(false)` если код уже был активирован.
pub fn redeem_referral(conn: &DbConnection, telegram_id: i64, code: &str, bonus: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET referred_by = ?1, daily_allowance = daily_allowance + ?2
         WHERE telegram_id = ?3 AND referred_by IS NULL",
        &[
            &code as &dyn rusqlite::ToSql,
            &bonus as &dyn rusqlite::ToSql,
            &telegram_id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(changed == 1)
}

/// Начисляет бонус владельцу реферального кода и инкрементирует его счётчик
/// приглашённых.
///
/// Возвращает `Ok(true)` если владелец кода найден и обновлён.
pub fn grant_referrer_bonus(conn: &DbConnection, code: &str, bonus: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET daily_allowance = daily_allowance + ?1, referral_count = referral_count + 1
         WHERE referral_code = ?2",
        &[&bonus as &dyn rusqlite::ToSql, &code as &dyn rusqlite::ToSql],
    )?;
    Ok(changed == 1)
}
