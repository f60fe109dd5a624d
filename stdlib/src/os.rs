use std::fmt::Write;
use std::time::Instant;

use anyhow::{Result, anyhow};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use moonbridge_core::val::NativeFn;
use moonbridge_core::{State, Table, TableRef, Val};
use once_cell::sync::Lazy;

use crate::Library;
use crate::args::{arg_error, check_str, check_table, opt_integer, opt_str};

pub struct OsLibrary;

const FUNCTIONS: &[(&str, NativeFn)] = &[("time", time), ("clock", clock), ("date", date), ("getenv", getenv)];

static STARTED: Lazy<Instant> = Lazy::new(Instant::now);

impl Library for OsLibrary {
    fn name(&self) -> &'static str {
        "os"
    }

    fn functions(&self) -> &'static [(&'static str, NativeFn)] {
        FUNCTIONS
    }

    fn open(&self, state: &State) -> Result<()> {
        // os.clock counts from here
        Lazy::force(&STARTED);
        state.push(Val::table(self.build()));
        state.set_global(self.name());
        Ok(())
    }
}

fn date_field(t: &TableRef, key: &str, default: Option<i64>) -> Result<i64> {
    match t.borrow().get_str(key) {
        Val::Nil => default.ok_or_else(|| anyhow!("field '{}' missing in date table", key)),
        v => v.to_integer().ok_or_else(|| anyhow!("field '{}' is not an integer", key)),
    }
}

/// Seconds since the epoch, now or for the local time described by a table.
fn time(state: &State) -> Result<usize> {
    if state.is_none_or_nil(1) {
        state.push_integer(Utc::now().timestamp());
        return Ok(1);
    }
    let t = check_table(state, 1, "time")?;
    let year = date_field(&t, "year", None)?;
    let month = date_field(&t, "month", None)?;
    let day = date_field(&t, "day", None)?;
    let hour = date_field(&t, "hour", Some(12))?;
    let min = date_field(&t, "min", Some(0))?;
    let sec = date_field(&t, "sec", Some(0))?;

    let out_of_range = || anyhow!("time result cannot be represented in this installation");
    let to_u32 = |v: i64| u32::try_from(v).map_err(|_| out_of_range());
    let stamp = Local
        .with_ymd_and_hms(
            i32::try_from(year).map_err(|_| out_of_range())?,
            to_u32(month)?,
            to_u32(day)?,
            to_u32(hour)?,
            to_u32(min)?,
            to_u32(sec)?,
        )
        .earliest()
        .ok_or_else(out_of_range)?;
    state.push_integer(stamp.timestamp());
    Ok(1)
}

fn clock(state: &State) -> Result<usize> {
    state.push_number(STARTED.elapsed().as_secs_f64());
    Ok(1)
}

fn date_table<Tz: TimeZone>(dt: &DateTime<Tz>) -> Table {
    let mut t = Table::new();
    t.set_str("year", Val::Int(dt.year() as i64));
    t.set_str("month", Val::Int(dt.month() as i64));
    t.set_str("day", Val::Int(dt.day() as i64));
    t.set_str("hour", Val::Int(dt.hour() as i64));
    t.set_str("min", Val::Int(dt.minute() as i64));
    t.set_str("sec", Val::Int(dt.second() as i64));
    t.set_str("wday", Val::Int(dt.weekday().number_from_sunday() as i64));
    t.set_str("yday", Val::Int(dt.ordinal() as i64));
    t.set_str("isdst", Val::Bool(false));
    t
}

fn format_date<Tz: TimeZone>(dt: &DateTime<Tz>, fmt: &str) -> Result<String>
where
    Tz::Offset: std::fmt::Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(arg_error(1, "date", &format!("invalid conversion specifier '{}'", fmt)));
    }
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.into_iter()))?;
    Ok(out)
}

/// `os.date([format [, time]])`; a leading `!` selects UTC and `*t` returns a table.
fn date(state: &State) -> Result<usize> {
    let fmt = opt_str(state, 1, "date")?.unwrap_or_else(|| "%c".into());
    let stamp = opt_integer(state, 2, "date", Utc::now().timestamp())?;
    let utc = DateTime::<Utc>::from_timestamp(stamp, 0).ok_or_else(|| arg_error(2, "date", "time out of range"))?;

    let (fmt, local) = match fmt.strip_prefix('!') {
        Some(rest) => (rest, false),
        None => (&*fmt, true),
    };
    if fmt.starts_with("*t") {
        let t = match local {
            true => date_table(&utc.with_timezone(&Local)),
            false => date_table(&utc),
        };
        state.push(Val::table(t));
        return Ok(1);
    }
    let text = match local {
        true => format_date(&utc.with_timezone(&Local), fmt)?,
        false => format_date(&utc, fmt)?,
    };
    state.push(Val::from(text));
    Ok(1)
}

fn getenv(state: &State) -> Result<usize> {
    let name = check_str(state, 1, "getenv")?;
    match std::env::var(&*name) {
        Ok(value) => state.push(Val::from(value)),
        Err(_) => state.push_nil(),
    }
    Ok(1)
}
