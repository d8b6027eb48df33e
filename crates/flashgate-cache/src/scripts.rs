//! Lua scripts executed atomically on the Redis server

/// Delete KEYS[1] only while it still holds ARGV[1]
pub const UNLOCK_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
end
return 0
";

/// Reset the expiry of KEYS[1] to ARGV[2] milliseconds only while it still holds ARGV[1]
pub const RENEW_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('pexpire', KEYS[1], ARGV[2])
end
return 0
";

/// Seckill admission
///
/// KEYS: stock, window hash, ordered-subjects set, order stream
/// ARGV: voucher id, user id, order id, now (epoch seconds)
///
/// Returns 0 admitted, 1 no stock, 2 duplicate, 3 not started, 4 ended.
pub const SECKILL_SCRIPT: &str = r"
local stockKey = KEYS[1]
local windowKey = KEYS[2]
local orderKey = KEYS[3]
local streamKey = KEYS[4]

local voucherId = ARGV[1]
local userId = ARGV[2]
local orderId = ARGV[3]
local now = tonumber(ARGV[4])

local beginAt = tonumber(redis.call('hget', windowKey, 'begin'))
if beginAt and now < beginAt then
    return 3
end
local endAt = tonumber(redis.call('hget', windowKey, 'end'))
if endAt and now > endAt then
    return 4
end

if redis.call('sismember', orderKey, userId) == 1 then
    return 2
end

local stock = tonumber(redis.call('get', stockKey))
if not stock or stock <= 0 then
    return 1
end

redis.call('incrby', stockKey, -1)
redis.call('sadd', orderKey, userId)
redis.call('xadd', streamKey, '*', 'id', orderId, 'userId', userId, 'voucherId', voucherId, 'createTime', ARGV[4])
return 0
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_compares_before_delete() {
        let get = UNLOCK_SCRIPT.find("'get'").unwrap();
        let del = UNLOCK_SCRIPT.find("'del'").unwrap();
        assert!(get < del);
    }

    #[test]
    fn test_seckill_script_checks_before_mutating() {
        let duplicate = SECKILL_SCRIPT.find("sismember").unwrap();
        let stock = SECKILL_SCRIPT.find("stock <= 0").unwrap();
        let decrement = SECKILL_SCRIPT.find("incrby").unwrap();
        let enqueue = SECKILL_SCRIPT.find("xadd").unwrap();

        assert!(duplicate < decrement);
        assert!(stock < decrement);
        assert!(decrement < enqueue);
    }
}
